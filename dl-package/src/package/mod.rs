//! Chaîne de packaging: dossier daté, export Shapefile, archives, nettoyage
//!
//! Chaque étape conditionne la suivante; la première erreur interrompt
//! l'exécution et le dossier partiellement rempli est laissé en place.

pub mod archive;
pub mod outdir;
pub mod preflight;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gpkg2shp::{export_table, WriteOptions};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ArchiveLayout, Settings};
pub use archive::{compute_file_checksum, zip_files, ArchiveInfo};
pub use preflight::{preflight, DatasetCheck};

/// Consignes de post-traitement manuel affichées en fin d'exécution
pub const ADVISORY: &str = "\
ArcGIS does not read the .qix spatial index files included in the Shapefile archive.
Before publishing for ArcGIS users, extract the archive and build a native .sbn index
on each Shapefile (ArcToolbox > Data Management Tools > Indexes > Add Spatial Index),
then re-create the archive with the .sbn/.sbx files.";

/// Export d'un jeu de données
#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutput {
    pub layer: String,
    pub table: String,
    pub features: usize,
    pub shape_type: String,

    /// Fichiers écrits dans le dossier (supprimés après archivage)
    pub files: Vec<String>,
}

/// Livrables d'une exécution
#[derive(Debug, Clone, Serialize)]
pub struct PackageOutputs {
    /// Dossier daté contenant les archives
    pub directory: PathBuf,

    /// Archive(s) Shapefile: une seule en disposition combinée
    pub shapefile_archives: Vec<ArchiveInfo>,

    /// Archive du GeoPackage source
    pub database_archive: ArchiveInfo,

    pub datasets: Vec<DatasetOutput>,
}

impl PackageOutputs {
    /// Chemin de la première archive Shapefile
    pub fn shapefile_archive(&self) -> &Path {
        self.shapefile_archives
            .first()
            .map(|a| a.path.as_path())
            .unwrap_or(self.directory.as_path())
    }
}

/// Vérifie la source sans rien écrire
pub fn check(settings: &Settings) -> Result<Vec<DatasetCheck>> {
    let (_, checks) = preflight(&settings.source, &settings.config)?;
    Ok(checks)
}

/// Nom du fichier source
fn source_file_name(source: &Path) -> Result<String> {
    source
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Invalid source path: {}", source.display()))
}

/// Exécute la chaîne complète et retourne les livrables
pub fn package_outputs(settings: &Settings) -> Result<PackageOutputs> {
    let config = &settings.config;

    // 1. Vérifications: rien n'est créé si la source est incomplète
    let (gpkg, checks) = preflight(&settings.source, config)?;
    let source_name = source_file_name(&settings.source)?;

    // 2. Dossier daté
    let dir_name = outdir::dated_dir_name(&config.name, settings.date, &config.outdir_date_format)?;
    let directory = outdir::create_output_dir(&settings.output_root, &dir_name)?;

    // 3. Export Shapefile, dans l'ordre de la configuration
    let options = WriteOptions {
        encoding: settings.encoding,
        spatial_index: settings.spatial_index,
        date: settings.date,
        ..WriteOptions::default()
    };

    let mut datasets = Vec::with_capacity(config.datasets.len());
    let mut sidecars = Vec::with_capacity(config.datasets.len());
    for dataset in &config.datasets {
        let summary = export_table(&gpkg, &dataset.query(), &directory, &dataset.layer, &options)
            .with_context(|| format!("Failed to export {} to Shapefile", dataset.table))?;

        if summary.files.len() < gpkg2shp::SIDECAR_EXTENSIONS.len() {
            warn!(
                layer = %dataset.layer,
                files = summary.files.len(),
                "Shapefile written without all sidecar files"
            );
        }
        if let Some(extent) = summary.bbox {
            debug!(
                layer = %dataset.layer,
                xmin = extent.min().x,
                ymin = extent.min().y,
                xmax = extent.max().x,
                ymax = extent.max().y,
                "Shapefile extent"
            );
        }

        datasets.push(DatasetOutput {
            layer: dataset.layer.clone(),
            table: dataset.table.clone(),
            features: summary.features,
            shape_type: summary.shape_type.to_string(),
            files: summary
                .files
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        });
        sidecars.push((dataset.layer.clone(), summary.files));
    }
    drop(gpkg);

    for (check, output) in checks.iter().zip(&datasets) {
        info!(
            layer = %output.layer,
            source_rows = check.rows,
            written = output.features,
            "Row count verified"
        );
    }

    // 4. Archive(s) Shapefile
    let shapefile_archives = match config.archive_layout {
        ArchiveLayout::Combined => {
            let files: Vec<PathBuf> = sidecars.iter().flat_map(|(_, f)| f.clone()).collect();
            let path = directory.join(format!("{}.shp.zip", config.shapefile_archive));
            vec![zip_files(&path, &files)?]
        }
        ArchiveLayout::PerDataset => sidecars
            .iter()
            .map(|(layer, files)| zip_files(&directory.join(format!("{}.shp.zip", layer)), files))
            .collect::<Result<Vec<_>>>()?,
    };

    // 5. Archive du GeoPackage source
    let database_archive = zip_files(
        &directory.join(format!("{}.zip", source_name)),
        &[settings.source.clone()],
    )?;

    // 6. Nettoyage: seules les archives restent
    let removed = outdir::remove_non_archives(&directory)?;
    info!(
        directory = %directory.display(),
        removed = removed.len(),
        "Removed intermediate files"
    );

    // 7. Consignes opérateur
    println!("\n{}", ADVISORY);

    Ok(PackageOutputs {
        directory,
        shapefile_archives,
        database_archive,
        datasets,
    })
}

/// Packaging avec le preset par défaut: retourne (archive Shapefile, archive GeoPackage)
pub fn package_source(source: &Path, output_root: &Path) -> Result<(PathBuf, PathBuf)> {
    let settings = Settings::for_source(source, output_root)?;
    let outputs = package_outputs(&settings)?;
    Ok((
        outputs.shapefile_archive().to_path_buf(),
        outputs.database_archive.path,
    ))
}
