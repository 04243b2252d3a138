//! Construction du SELECT de projection (renommage des colonnes)

use crate::Gpkg2ShpError;

/// Colonne source et son nom dans le Shapefile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source: String,
    pub target: String,
}

impl ColumnMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Projection d'une table: colonnes sélectionnées et renommées
#[derive(Debug, Clone)]
pub struct SelectQuery {
    /// Table GeoPackage source
    pub table: String,

    /// Colonnes attributaires, dans l'ordre de sortie
    pub columns: Vec<ColumnMapping>,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnMapping>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Vérifie les noms cibles (contraintes DBF)
    pub fn validate(&self) -> Result<(), Gpkg2ShpError> {
        for column in &self.columns {
            if !is_valid_dbf_name(&column.target) {
                return Err(Gpkg2ShpError::InvalidFieldName(column.target.clone()));
            }
        }
        Ok(())
    }

    /// SQL exécuté sur le GeoPackage; la géométrie est toujours la dernière colonne
    pub fn to_sql(&self, geometry_column: &str) -> String {
        let mut select = Vec::with_capacity(self.columns.len() + 1);
        for column in &self.columns {
            select.push(format!(
                "{} AS {}",
                quote_ident(&column.source),
                quote_ident(&column.target)
            ));
        }
        select.push(quote_ident(geometry_column));

        format!(
            "SELECT {} FROM {}",
            select.join(", "),
            quote_ident(&self.table)
        )
    }
}

/// Met un identifiant SQL entre guillemets doubles
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Nom de champ DBF: 1 à 10 caractères ASCII imprimables
pub fn is_valid_dbf_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 10 && name.bytes().all(|b| b.is_ascii_graphic())
}
