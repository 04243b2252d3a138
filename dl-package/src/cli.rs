//! Définition et implémentation des commandes CLI
//!
//! - commande par défaut: packaging complet (Shapefiles + archives)
//! - `check`: vérification de la source sans écriture

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::{error, info};

use dl_package::config::{ArchiveLayout, Config, EnvOverrides, Settings};
use dl_package::package;
use dl_package::report::PackageReport;

#[derive(Subcommand)]
pub enum Commands {
    /// Vérifier que le GeoPackage source contient toutes les tables et colonnes à exporter
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },
}

/// Source et configuration, communes à toutes les commandes
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// GeoPackage source (défaut: env DL_SOURCE ou designatedlands.gpkg)
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Preset de configuration (designatedlands) ou chemin vers un fichier JSON
    #[arg(long, default_value = "designatedlands")]
    pub config: String,

    /// Encodage des textes DBF, ex: windows-1252 (défaut: env DL_ENCODING ou config)
    #[arg(long)]
    pub encoding: Option<String>,
}

/// Arguments du packaging (commande par défaut)
#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Répertoire parent du dossier daté (défaut: env DL_OUTPUT_ROOT ou .)
    #[arg(short, long)]
    pub output_root: Option<PathBuf>,

    /// Ne pas écrire les index spatiaux .qix
    #[arg(long)]
    pub no_spatial_index: bool,

    /// Regroupement des Shapefiles: combined, per-dataset (défaut: config)
    #[arg(long)]
    pub archive_layout: Option<ArchiveLayout>,

    /// Écrire un rapport JSON à ce chemin (hors du dossier de sortie)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

fn load_settings(args: &SourceArgs, output_root: Option<PathBuf>) -> Result<Settings> {
    let config = Config::from_spec(&args.config)?;
    let cli = EnvOverrides {
        source: args.source.clone(),
        output_root,
        encoding: args.encoding.clone(),
    };
    Settings::resolve(config, cli, EnvOverrides::from_env())
}

/// Exécute le packaging complet
pub fn cmd_package(args: &PackageArgs) -> Result<()> {
    let mut settings = load_settings(&args.source, args.output_root.clone())?;
    settings.spatial_index = !args.no_spatial_index;
    if let Some(layout) = args.archive_layout {
        settings.config.archive_layout = layout;
    }

    println!("=== Package {} ===", settings.config.name);
    println!("Source: {}", settings.source.display());
    println!("Output root: {}", settings.output_root.display());
    println!("Encoding: {}", settings.encoding.name());
    println!("Archive layout: {:?}", settings.config.archive_layout);
    println!("Spatial index: {}", settings.spatial_index);

    let start = Instant::now();
    let result = package::package_outputs(&settings);
    let duration = start.elapsed();

    let report = match &result {
        Ok(outputs) => PackageReport::from_outputs(&settings.source, outputs, duration),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Packaging failed");
            PackageReport::failed(&settings.source, e, duration)
        }
    };

    if let Some(path) = &args.report {
        report.save_to_file(path)?;
        info!(path = %path.display(), "Report written");
    }

    let outputs = result?;
    report.display();
    info!(
        shapefile_archive = %outputs.shapefile_archive().display(),
        database_archive = %outputs.database_archive.path.display(),
        "{}",
        report.summary()
    );

    Ok(())
}

/// Vérifie la source sans écrire
pub fn cmd_check(args: &SourceArgs) -> Result<()> {
    let settings = load_settings(args, None)?;
    let checks = package::check(&settings)?;

    println!("=== Check {} ===", settings.source.display());
    for c in &checks {
        println!(
            "  {} ({}): {} rows, {} {}",
            c.layer, c.table, c.rows, c.geometry_type, c.geometry_column
        );
    }
    println!("OK: {} datasets ready", checks.len());

    Ok(())
}
