//! # gpkg2shp
//!
//! Export de tables GeoPackage vers ESRI Shapefile, sans GDAL.
//!
//! ## Features
//!
//! - Lecture du GeoPackage en lecture seule via `rusqlite`
//! - Décodage des blobs GeoPackage (en-tête GP + WKB) avec `geozero`
//! - Projection et renommage des colonnes (noms DBF de 10 caractères)
//! - Écriture .shp, .shx, .dbf, .prj et de l'index spatial .qix
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gpkg2shp::{export_table, ColumnMapping, GeoPackage, SelectQuery, WriteOptions};
//! use std::path::Path;
//!
//! let gpkg = GeoPackage::open(Path::new("designatedlands.gpkg"))?;
//! let query = SelectQuery::new(
//!     "designatedlands",
//!     vec![ColumnMapping::new("designatedlands_id", "dl_id")],
//! );
//! let summary = export_table(&gpkg, &query, Path::new("out"), "designatedlands", &WriteOptions::default())?;
//! println!("{} features", summary.features);
//! ```

pub mod error;
pub mod gpkg;
pub mod shp;
pub mod types;

pub use error::Gpkg2ShpError;
pub use gpkg::query::{ColumnMapping, SelectQuery};
pub use gpkg::GeoPackage;
pub use shp::{export_layer, shapefile_paths, ShapeType, WriteOptions, SIDECAR_EXTENSIONS};
pub use types::{ExportSummary, Feature, FieldDef, FieldKind, FieldValue, Layer};

use std::path::Path;

use tracing::info;

/// Exporte une table GeoPackage en Shapefile `dir/basename.*`
///
/// La projection `query` sélectionne et renomme les colonnes attributaires;
/// la géométrie est toujours la colonne déclarée dans `gpkg_geometry_columns`.
///
/// # Errors
///
/// Retourne `Gpkg2ShpError` si la table ou une colonne est absente, si une
/// géométrie est illisible, si l'écriture échoue, ou si le nombre
/// d'enregistrements écrits diffère de celui de la table source.
pub fn export_table(
    gpkg: &GeoPackage,
    query: &SelectQuery,
    dir: &Path,
    basename: &str,
    options: &WriteOptions,
) -> Result<ExportSummary, Gpkg2ShpError> {
    info!(
        table = %query.table,
        columns = query.columns.len(),
        "Reading layer from {}",
        gpkg.path().display()
    );

    let layer = gpkg.select(query)?;
    let summary = export_layer(&layer, dir, basename, options)?;

    // Pas de filtre: toutes les lignes de la source doivent être écrites
    let source_rows = gpkg.count(&query.table)?;
    if summary.features != source_rows {
        return Err(Gpkg2ShpError::RowCountMismatch {
            table: query.table.clone(),
            source_rows,
            written: summary.features,
        });
    }

    Ok(summary)
}
