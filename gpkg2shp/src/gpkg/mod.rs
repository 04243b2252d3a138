//! Lecture des tables GeoPackage (SQLite)

pub mod blob;
pub mod query;

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::types::{Feature, FieldDef, FieldKind, FieldValue, Layer};
use crate::Gpkg2ShpError;
use query::{quote_ident, SelectQuery};

/// Colonne déclarée d'une table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Type déclaré (ex: "TEXT", "INTEGER", "TEXT(50)"), vide si absent
    pub decl_type: String,
}

/// Colonne géométrique enregistrée dans gpkg_geometry_columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryColumn {
    pub column: String,
    pub geometry_type: String,
    pub srs_id: i32,
}

/// GeoPackage ouvert en lecture seule
pub struct GeoPackage {
    path: PathBuf,
    conn: Connection,
}

impl std::fmt::Debug for GeoPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoPackage").field("path", &self.path).finish()
    }
}

impl GeoPackage {
    /// Ouvre un GeoPackage existant sans accès en écriture
    pub fn open(path: &Path) -> Result<Self, Gpkg2ShpError> {
        // SQLite créerait un fichier vide: on veut l'erreur d'I/O d'origine
        std::fs::metadata(path)?;

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let gpkg = Self {
            path: path.to_path_buf(),
            conn,
        };

        if !gpkg.table_exists("gpkg_geometry_columns")? {
            return Err(Gpkg2ShpError::InvalidGeoPackage {
                path: path.display().to_string(),
                reason: "missing gpkg_geometry_columns table".to_string(),
            });
        }

        debug!(path = %path.display(), "Opened GeoPackage");
        Ok(gpkg)
    }

    /// Chemin du fichier
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Teste la présence d'une table (ou vue)
    pub fn table_exists(&self, table: &str) -> Result<bool, Gpkg2ShpError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Colonnes déclarées d'une table
    pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, Gpkg2ShpError> {
        if !self.table_exists(table)? {
            return Err(Gpkg2ShpError::MissingTable(table.to_string()));
        }

        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(columns)
    }

    /// Colonne géométrique de la table
    pub fn geometry_column(&self, table: &str) -> Result<GeometryColumn, Gpkg2ShpError> {
        self.conn
            .query_row(
                "SELECT column_name, geometry_type_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1 COLLATE NOCASE",
                [table],
                |row| {
                    Ok(GeometryColumn {
                        column: row.get(0)?,
                        geometry_type: row.get(1)?,
                        srs_id: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| Gpkg2ShpError::MissingGeometryColumn(table.to_string()))
    }

    /// Définition WKT du SRS d'une table, None si non défini
    pub fn srs_definition(&self, table: &str) -> Result<Option<String>, Gpkg2ShpError> {
        let geometry_column = self.geometry_column(table)?;

        let definition: Option<String> = self
            .conn
            .query_row(
                "SELECT definition FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
                [geometry_column.srs_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(definition
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case("undefined")))
    }

    /// Nombre de lignes d'une table
    pub fn count(&self, table: &str) -> Result<usize, Gpkg2ShpError> {
        if !self.table_exists(table)? {
            return Err(Gpkg2ShpError::MissingTable(table.to_string()));
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Vérifie qu'une projection est exécutable: table, géométrie et colonnes présentes
    pub fn check_query(&self, query: &SelectQuery) -> Result<GeometryColumn, Gpkg2ShpError> {
        query.validate()?;

        let columns = self.columns(&query.table)?;
        let geometry_column = self.geometry_column(&query.table)?;

        for mapping in &query.columns {
            if find_column(&columns, &mapping.source).is_none() {
                return Err(Gpkg2ShpError::missing_column(&query.table, &mapping.source));
            }
        }

        Ok(geometry_column)
    }

    /// Exécute la projection et charge la couche en mémoire
    pub fn select(&self, query: &SelectQuery) -> Result<Layer, Gpkg2ShpError> {
        let geometry_column = self.check_query(query)?;
        let columns = self.columns(&query.table)?;

        let declared: Vec<Option<FieldKind>> = query
            .columns
            .iter()
            .map(|mapping| {
                let info = find_column(&columns, &mapping.source)
                    .ok_or_else(|| Gpkg2ShpError::missing_column(&query.table, &mapping.source))?;
                kind_from_decl_type(&mapping.target, &info.decl_type)
            })
            .collect::<Result<_, _>>()?;

        let sql = query.to_sql(&geometry_column.column);
        debug!(sql = %sql, "Selecting layer");

        let mut stmt = self.conn.prepare(&sql)?;
        let n_fields = query.columns.len();
        let mut rows = stmt.query([])?;
        let mut features = Vec::new();

        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(n_fields);
            for i in 0..n_fields {
                values.push(to_field_value(&query.columns[i].target, row.get_ref(i)?)?);
            }

            let geometry = match row.get_ref(n_fields)? {
                ValueRef::Null => None,
                ValueRef::Blob(blob) => blob::decode(blob).map_err(|reason| {
                    Gpkg2ShpError::invalid_geometry(&query.table, features.len() + 1, reason)
                })?,
                other => {
                    return Err(Gpkg2ShpError::invalid_geometry(
                        &query.table,
                        features.len() + 1,
                        format!("expected BLOB, found {:?}", other.data_type()),
                    ))
                }
            };

            features.push(Feature { geometry, values });
        }

        let fields = query
            .columns
            .iter()
            .zip(declared)
            .enumerate()
            .map(|(i, (mapping, kind))| {
                let values = features.iter().map(|f| &f.values[i]);
                let kind = match kind {
                    Some(kind) => widen_kind(&mapping.target, kind, values),
                    None => infer_kind(&mapping.target, values)?,
                };
                Ok(FieldDef {
                    name: mapping.target.clone(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>, Gpkg2ShpError>>()?;

        let srs_wkt = self.srs_definition(&query.table)?;
        if srs_wkt.is_none() {
            warn!(table = %query.table, srs_id = geometry_column.srs_id, "Undefined spatial reference system");
        }

        Ok(Layer {
            name: query.table.clone(),
            geometry_type: geometry_column.geometry_type,
            fields,
            features,
            srs_wkt,
        })
    }
}

fn find_column<'a>(columns: &'a [ColumnInfo], name: &str) -> Option<&'a ColumnInfo> {
    columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// Largeur DBF maximale d'un champ texte
const MAX_CHARACTER_WIDTH: u8 = 254;

/// Largeur maximale d'un entier 64 bits rendu en texte
const MAX_INTEGER_WIDTH: u8 = 20;

/// Type DBF d'après le type SQLite déclaré; None si le type doit être inféré des valeurs
pub fn kind_from_decl_type(field: &str, decl_type: &str) -> Result<Option<FieldKind>, Gpkg2ShpError> {
    let decl = decl_type.trim().to_ascii_uppercase();
    if decl.is_empty() {
        return Ok(None);
    }

    let (base, width) = match decl.find('(') {
        Some(pos) => {
            let width = decl[pos + 1..]
                .trim_end_matches(')')
                .split(',')
                .next()
                .and_then(|w| w.trim().parse::<usize>().ok());
            (decl[..pos].trim(), width)
        }
        None => (decl.as_str(), None),
    };

    let kind = match base {
        b if b.contains("INT") => FieldKind::Integer {
            width: MAX_INTEGER_WIDTH,
        },
        "BOOLEAN" | "BOOL" => FieldKind::Logical,
        "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" | "NUMERIC" | "DECIMAL" => {
            FieldKind::Double {
                width: 24,
                decimals: 15,
            }
        }
        "DATE" => FieldKind::Date,
        "DATETIME" | "TIMESTAMP" => FieldKind::Character { width: 24 },
        "BLOB" => {
            return Err(Gpkg2ShpError::UnsupportedField {
                field: field.to_string(),
                reason: "BLOB columns cannot be stored in a DBF".to_string(),
            })
        }
        _ => FieldKind::Character {
            width: width
                .map(|w| w.clamp(1, MAX_CHARACTER_WIDTH as usize) as u8)
                .unwrap_or(MAX_CHARACTER_WIDTH),
        },
    };

    Ok(Some(kind))
}

/// Type DBF d'après la première valeur non nulle
fn infer_kind<'a>(
    field: &str,
    mut values: impl Iterator<Item = &'a FieldValue>,
) -> Result<FieldKind, Gpkg2ShpError> {
    let kind = match values.find(|v| !matches!(v, FieldValue::Null)) {
        Some(FieldValue::Integer(_)) => FieldKind::Integer {
            width: MAX_INTEGER_WIDTH,
        },
        Some(FieldValue::Real(_)) => FieldKind::Double {
            width: 24,
            decimals: 15,
        },
        Some(FieldValue::Text(_)) | Some(FieldValue::Null) | None => FieldKind::Character {
            width: MAX_CHARACTER_WIDTH,
        },
    };
    debug!(field, ?kind, "Inferred field type from values");
    Ok(kind)
}

/// Élargit le type déclaré quand une valeur stockée ne s'y écrit pas telle quelle
///
/// SQLite ne contraint pas les valeurs au type déclaré: un réel dans une
/// colonne INTEGER passe en numérique à décimales, un texte dans une colonne
/// numérique, logique ou date passe en caractères.
fn widen_kind<'a>(
    field: &str,
    declared: FieldKind,
    values: impl Iterator<Item = &'a FieldValue>,
) -> FieldKind {
    let character = FieldKind::Character {
        width: MAX_CHARACTER_WIDTH,
    };

    let mut kind = declared;
    for value in values {
        kind = match (kind, value) {
            (FieldKind::Character { .. }, _) => break,
            (_, FieldValue::Null) => kind,
            (FieldKind::Integer { .. } | FieldKind::Logical, FieldValue::Real(_)) => {
                FieldKind::Double {
                    width: 24,
                    decimals: 15,
                }
            }
            (FieldKind::Date, FieldValue::Text(_)) => kind,
            (FieldKind::Date, _) | (_, FieldValue::Text(_)) => character,
            _ => kind,
        };
    }

    if kind != declared {
        warn!(field, ?declared, ?kind, "Stored values do not fit the declared type, field widened");
    }
    kind
}

fn to_field_value(field: &str, value: ValueRef<'_>) -> Result<FieldValue, Gpkg2ShpError> {
    Ok(match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(i) => FieldValue::Integer(i),
        ValueRef::Real(r) => FieldValue::Real(r),
        ValueRef::Text(bytes) => FieldValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => {
            return Err(Gpkg2ShpError::UnsupportedField {
                field: field.to_string(),
                reason: "BLOB value cannot be stored in a DBF".to_string(),
            })
        }
    })
}
