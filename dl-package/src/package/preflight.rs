//! Vérifications avant toute écriture

use std::path::Path;

use anyhow::{Context, Result};
use gpkg2shp::GeoPackage;
use serde::Serialize;
use tracing::info;

use crate::config::Config;

/// État d'un jeu de données dans la source
#[derive(Debug, Clone, Serialize)]
pub struct DatasetCheck {
    pub layer: String,
    pub table: String,

    /// Colonne géométrique et son type déclaré
    pub geometry_column: String,
    pub geometry_type: String,

    /// Nombre de lignes de la table
    pub rows: usize,
}

/// Ouvre la source et vérifie tables, colonnes géométriques et colonnes projetées
pub fn preflight(source: &Path, config: &Config) -> Result<(GeoPackage, Vec<DatasetCheck>)> {
    let gpkg = GeoPackage::open(source)
        .with_context(|| format!("Cannot open source GeoPackage {}", source.display()))?;

    let mut checks = Vec::with_capacity(config.datasets.len());
    for dataset in &config.datasets {
        let geometry = gpkg
            .check_query(&dataset.query())
            .with_context(|| format!("Dataset {} is not exportable", dataset.layer))?;
        let rows = gpkg.count(&dataset.table)?;

        info!(
            layer = %dataset.layer,
            table = %dataset.table,
            geometry_type = %geometry.geometry_type,
            rows,
            "Dataset ready"
        );

        checks.push(DatasetCheck {
            layer: dataset.layer.clone(),
            table: dataset.table.clone(),
            geometry_column: geometry.column,
            geometry_type: geometry.geometry_type,
            rows,
        });
    }

    Ok((gpkg, checks))
}
