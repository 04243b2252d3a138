//! Types d'erreurs pour le crate gpkg2shp

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture GeoPackage ou de l'écriture Shapefile
#[derive(Debug, Error)]
pub enum Gpkg2ShpError {
    /// Erreur d'I/O (lecture du GeoPackage, écriture des fichiers)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur SQLite remontée telle quelle
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Le fichier n'est pas un GeoPackage exploitable
    #[error("Invalid GeoPackage {path}: {reason}")]
    InvalidGeoPackage { path: String, reason: String },

    /// Table absente du GeoPackage
    #[error("no such table: {0}")]
    MissingTable(String),

    /// Colonne absente d'une table
    #[error("no such column: {table}.{column}")]
    MissingColumn { table: String, column: String },

    /// Table sans colonne géométrique enregistrée
    #[error("table {0} has no geometry column in gpkg_geometry_columns")]
    MissingGeometryColumn(String),

    /// Blob géométrique GeoPackage invalide
    #[error("Invalid geometry in {table} (row {row}): {reason}")]
    InvalidGeometry {
        table: String,
        row: usize,
        reason: String,
    },

    /// Type de géométrie non exportable en Shapefile
    #[error("Unsupported geometry type for Shapefile: {0}")]
    UnsupportedGeometry(String),

    /// Une couche Shapefile ne porte qu'un seul type de géométrie
    #[error("Mixed geometry types in {layer}: expected {expected}, found {found}")]
    MixedGeometry {
        layer: String,
        expected: String,
        found: String,
    },

    /// Type de colonne non exportable en DBF
    #[error("Unsupported value type for field {field}: {reason}")]
    UnsupportedField { field: String, reason: String },

    /// Nom de champ DBF invalide
    #[error("Invalid DBF field name '{0}': 1 to 10 ASCII characters required")]
    InvalidFieldName(String),

    /// Fichier trop volumineux pour le format Shapefile (offsets 32 bits)
    #[error("Shapefile {0} exceeds the 2 GB format limit")]
    FileTooLarge(String),

    /// Nombre d'enregistrements écrits différent de la source
    #[error("Row count mismatch for {table}: source has {source_rows}, wrote {written}")]
    RowCountMismatch {
        table: String,
        source_rows: usize,
        written: usize,
    },
}

impl Gpkg2ShpError {
    /// Crée une erreur de géométrie invalide avec contexte
    pub fn invalid_geometry(table: impl Into<String>, row: usize, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            table: table.into(),
            row,
            reason: reason.into(),
        }
    }

    /// Crée une erreur de colonne manquante
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}
