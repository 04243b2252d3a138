//! Rapport d'exécution du packaging
//!
//! Résumé console et export JSON des livrables produits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::package::{ArchiveInfo, PackageOutputs};

/// Statut global de l'exécution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackageStatus {
    /// Archives produites
    Success,
    /// Exécution interrompue
    Failed,
}

/// Archive décrite dans le rapport
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub file: String,
    pub size: u64,
    pub blake3: String,
    pub entries: Vec<String>,
}

impl From<&ArchiveInfo> for ArchiveEntry {
    fn from(info: &ArchiveInfo) -> Self {
        Self {
            file: info
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: info.size,
            blake3: info.blake3.clone(),
            entries: info.entries.clone(),
        }
    }
}

/// Statistiques par jeu de données
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub layer: String,
    pub table: String,
    pub features: usize,
    pub shape_type: String,
}

/// Rapport complet
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub source: PathBuf,
    pub directory: Option<PathBuf>,
    pub status: PackageStatus,
    pub duration_secs: f64,
    pub archives: Vec<ArchiveEntry>,
    pub datasets: Vec<DatasetStats>,
    pub error: Option<String>,
}

impl PackageReport {
    /// Rapport d'une exécution réussie
    pub fn from_outputs(source: &Path, outputs: &PackageOutputs, duration: Duration) -> Self {
        let archives = outputs
            .shapefile_archives
            .iter()
            .chain(std::iter::once(&outputs.database_archive))
            .map(ArchiveEntry::from)
            .collect();

        let datasets = outputs
            .datasets
            .iter()
            .map(|d| DatasetStats {
                layer: d.layer.clone(),
                table: d.table.clone(),
                features: d.features,
                shape_type: d.shape_type.clone(),
            })
            .collect();

        Self {
            source: source.to_path_buf(),
            directory: Some(outputs.directory.clone()),
            status: PackageStatus::Success,
            duration_secs: duration.as_secs_f64(),
            archives,
            datasets,
            error: None,
        }
    }

    /// Rapport d'une exécution en échec
    pub fn failed(source: &Path, error: &anyhow::Error, duration: Duration) -> Self {
        Self {
            source: source.to_path_buf(),
            directory: None,
            status: PackageStatus::Failed,
            duration_secs: duration.as_secs_f64(),
            archives: Vec::new(),
            datasets: Vec::new(),
            error: Some(format!("{:#}", error)),
        }
    }

    /// Nombre total d'enregistrements exportés
    pub fn total_features(&self) -> usize {
        self.datasets.iter().map(|d| d.features).sum()
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("PACKAGE REPORT - {}", self.source.display());
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);
        if let Some(dir) = &self.directory {
            println!("Directory: {}", dir.display());
        }

        if !self.datasets.is_empty() {
            println!("\n--- DATASETS ---");
            for d in &self.datasets {
                println!(
                    "  {} ({}): {} features, {}",
                    d.layer, d.table, d.features, d.shape_type
                );
            }
        }

        if !self.archives.is_empty() {
            println!("\n--- ARCHIVES ---");
            for a in &self.archives {
                println!("  {} ({} bytes, {} entries)", a.file, a.size, a.entries.len());
                println!("    blake3: {}", a.blake3);
            }
        }

        if let Some(error) = &self.error {
            println!("\n--- ERROR ---");
            println!("  {}", error);
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Cannot write report {}", path.display()))?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} datasets, {} features, {} archives",
            self.source.display(),
            self.datasets.len(),
            self.total_features(),
            self.archives.len()
        )
    }
}
