//! Dossier de sortie daté et nettoyage final

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

/// Nom du dossier: `<name>_<date formatée>`
pub fn dated_dir_name(name: &str, date: NaiveDate, format: &str) -> Result<String> {
    let mut stamp = String::new();
    // Un format chrono invalide remonte une erreur au lieu de paniquer
    if write!(stamp, "{}", date.format(format)).is_err() {
        bail!("Invalid date format: {}", format);
    }
    if stamp.is_empty() || stamp.contains(['/', '\\']) {
        bail!("Date format {} produces an invalid directory name: {:?}", format, stamp);
    }
    Ok(format!("{}_{}", name, stamp))
}

/// Crée le dossier daté sous `root`; échoue s'il existe déjà
pub fn create_output_dir(root: &Path, dir_name: &str) -> Result<PathBuf> {
    let dir = root.join(dir_name);
    // create_dir non récursif: un dossier existant est une erreur
    std::fs::create_dir(&dir)
        .with_context(|| format!("Cannot create output directory {}", dir.display()))?;
    info!(path = %dir.display(), "Created output directory");
    Ok(dir)
}

/// Supprime tous les fichiers du dossier qui ne sont pas des archives .zip
pub fn remove_non_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    for entry in std::fs::read_dir(dir).with_context(|| format!("Cannot list {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let is_zip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if is_zip {
            continue;
        }

        std::fs::remove_file(&path)
            .with_context(|| format!("Cannot remove {}", path.display()))?;
        debug!(path = %path.display(), "Removed intermediate file");
        removed.push(path);
    }

    removed.sort();
    Ok(removed)
}
