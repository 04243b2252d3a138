//! # dl-package
//!
//! Packaging des sorties designated lands pour diffusion.
//!
//! ## Features
//!
//! - Export des tables GeoPackage en Shapefile avec colonnes renommées
//! - Index spatial .qix pour chaque Shapefile
//! - Dossier de sortie daté, archives zip et empreintes blake3
//! - Rapport console et JSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Packaging complet dans ./designatedlands_<date>/
//! dl-package --source designatedlands.gpkg
//!
//! # Vérifier la source sans rien écrire
//! dl-package check --source designatedlands.gpkg
//! ```

pub mod config;
pub mod package;
pub mod report;

pub use config::{ArchiveLayout, Config, Settings};
pub use package::{check, package_outputs, package_source, PackageOutputs};
pub use report::{PackageReport, PackageStatus};
