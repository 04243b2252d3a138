//! Configuration du packaging

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use encoding_rs::Encoding;
use gpkg2shp::shp::dbf::language_driver_id;
use gpkg2shp::{ColumnMapping, SelectQuery};
use regex::Regex;
use thiserror::Error;

/// Variable d'environnement: GeoPackage source
pub const ENV_SOURCE: &str = "DL_SOURCE";

/// Variable d'environnement: répertoire parent du dossier daté
pub const ENV_OUTPUT_ROOT: &str = "DL_OUTPUT_ROOT";

/// Variable d'environnement: encodage des .dbf
pub const ENV_ENCODING: &str = "DL_ENCODING";

/// Erreurs de validation de la configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration declares no dataset")]
    NoDatasets,

    #[error("invalid target column '{target}' in {layer}: 1 to 10 characters, letter first, then letters, digits or '_'")]
    InvalidTarget { layer: String, target: String },

    #[error("duplicate target column '{target}' in {layer}")]
    DuplicateTarget { layer: String, target: String },

    #[error("duplicate layer name '{0}'")]
    DuplicateLayer(String),

    #[error("invalid layer name '{0}'")]
    InvalidLayer(String),

    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("encoding '{0}' has no DBF language driver (single-byte Windows code pages only)")]
    UnsupportedEncoding(String),
}

/// Regroupement des Shapefiles dans les archives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveLayout {
    /// Une seule archive pour tous les jeux de données
    #[default]
    Combined,
    /// Une archive par jeu de données
    PerDataset,
}

impl std::str::FromStr for ArchiveLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "combined" | "single" => Ok(ArchiveLayout::Combined),
            "per-dataset" | "per_dataset" | "split" => Ok(ArchiveLayout::PerDataset),
            _ => Err(format!(
                "Invalid archive layout: {}. Use: combined, per-dataset",
                s
            )),
        }
    }
}

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Préfixe du dossier de sortie daté
    pub name: String,

    /// GeoPackage source par défaut
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Tables à exporter, dans l'ordre
    pub datasets: Vec<DatasetConfig>,

    /// Nom de base de l'archive Shapefile combinée (`<nom>.shp.zip`)
    #[serde(default = "default_shapefile_archive")]
    pub shapefile_archive: String,

    #[serde(default)]
    pub archive_layout: ArchiveLayout,

    /// Label `encoding_rs` de l'encodage des .dbf
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Format `chrono` de la date du dossier de sortie
    #[serde(default = "default_date_format")]
    pub outdir_date_format: String,
}

/// Configuration d'un jeu de données
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    /// Table GeoPackage source
    pub table: String,

    /// Nom de base des fichiers Shapefile
    pub layer: String,

    /// Colonnes exportées et leur nom DBF
    pub fields: Vec<FieldMapping>,
}

/// Mapping d'un champ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldMapping {
    /// Colonne de la table source
    pub source: String,

    /// Nom du champ DBF
    pub target: String,
}

fn default_source() -> PathBuf {
    PathBuf::from("designatedlands.gpkg")
}

fn default_shapefile_archive() -> String {
    "designatedlands".to_string()
}

fn default_encoding() -> String {
    "windows-1252".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn target_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,9}$").expect("valid regex"))
}

/// Résout un label d'encodage en encodage mono-octet utilisable dans un .dbf
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, ConfigError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ConfigError::UnknownEncoding(label.to_string()))?;
    if language_driver_id(encoding).is_none() {
        return Err(ConfigError::UnsupportedEncoding(label.to_string()));
    }
    Ok(encoding)
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "designatedlands" => {
                Self::load_embedded(include_str!("presets/designatedlands.json"))
            }
            _ => anyhow::bail!("Unknown preset: {}. Use: designatedlands", preset),
        }
    }

    /// Preset si le nom est connu, sinon chemin vers un fichier JSON
    pub fn from_spec(spec: &str) -> Result<Self> {
        let path = Path::new(spec);
        if path.extension().is_some_and(|ext| ext == "json") || path.is_file() {
            Self::load(path)
        } else {
            Self::from_preset(spec)
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Vérifie les noms de champs, de couches et l'encodage
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.datasets.is_empty() {
            return Err(ConfigError::NoDatasets);
        }

        let mut layers = HashSet::new();
        for dataset in &self.datasets {
            if dataset.layer.is_empty()
                || dataset.layer.contains(['/', '\\'])
                || dataset.layer.starts_with('.')
            {
                return Err(ConfigError::InvalidLayer(dataset.layer.clone()));
            }
            if !layers.insert(dataset.layer.to_lowercase()) {
                return Err(ConfigError::DuplicateLayer(dataset.layer.clone()));
            }

            let mut targets = HashSet::new();
            for field in &dataset.fields {
                if !target_regex().is_match(&field.target) {
                    return Err(ConfigError::InvalidTarget {
                        layer: dataset.layer.clone(),
                        target: field.target.clone(),
                    });
                }
                // Les noms DBF sont comparés sans tenir compte de la casse
                if !targets.insert(field.target.to_lowercase()) {
                    return Err(ConfigError::DuplicateTarget {
                        layer: dataset.layer.clone(),
                        target: field.target.clone(),
                    });
                }
            }
        }

        resolve_encoding(&self.encoding)?;
        Ok(())
    }
}

impl DatasetConfig {
    /// Projection SQL correspondante
    pub fn query(&self) -> SelectQuery {
        SelectQuery::new(
            self.table.clone(),
            self.fields
                .iter()
                .map(|f| ColumnMapping::new(f.source.clone(), f.target.clone()))
                .collect(),
        )
    }
}

/// Valeurs fournies par l'environnement (après chargement du .env)
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub source: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub encoding: Option<String>,
}

impl EnvOverrides {
    /// Charge les valeurs depuis les variables d'environnement
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            source: non_empty(ENV_SOURCE).map(PathBuf::from),
            output_root: non_empty(ENV_OUTPUT_ROOT).map(PathBuf::from),
            encoding: non_empty(ENV_ENCODING),
        }
    }
}

/// Paramètres effectifs d'une exécution
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,

    /// GeoPackage source
    pub source: PathBuf,

    /// Répertoire parent du dossier daté
    pub output_root: PathBuf,

    /// Encodage des .dbf
    pub encoding: &'static Encoding,

    /// Écrire les index .qix
    pub spatial_index: bool,

    /// Date du dossier de sortie et des en-têtes .dbf
    pub date: NaiveDate,
}

impl Settings {
    /// Fusionne CLI > environnement > configuration
    pub fn resolve(config: Config, cli: EnvOverrides, env: EnvOverrides) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let source = cli
            .source
            .or(env.source)
            .unwrap_or_else(|| config.source.clone());
        let output_root = cli
            .output_root
            .or(env.output_root)
            .unwrap_or_else(|| PathBuf::from("."));
        let encoding_label = cli
            .encoding
            .or(env.encoding)
            .unwrap_or_else(|| config.encoding.clone());
        let encoding = resolve_encoding(&encoding_label).context("Invalid encoding")?;

        Ok(Self {
            config,
            source,
            output_root,
            encoding,
            spatial_index: true,
            date: Local::now().date_naive(),
        })
    }

    /// Paramètres du preset sans surcharge, pour une source donnée
    pub fn for_source(source: &Path, output_root: &Path) -> Result<Self> {
        let mut settings = Self::resolve(
            Config::from_preset("designatedlands")?,
            EnvOverrides::default(),
            EnvOverrides::default(),
        )?;
        settings.source = source.to_path_buf();
        settings.output_root = output_root.to_path_buf();
        Ok(settings)
    }
}
