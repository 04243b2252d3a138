//! Archives zip des livrables

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Timelike};
use serde::Serialize;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive produite
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub path: PathBuf,

    /// Taille en octets
    pub size: u64,

    /// Empreinte blake3 (hex)
    pub blake3: String,

    /// Noms des entrées, dans l'ordre d'ajout
    pub entries: Vec<String>,
}

/// Date de modification d'un fichier au format zip (heure locale)
fn zip_timestamp(path: &Path) -> Option<zip::DateTime> {
    let modified: DateTime<Local> = std::fs::metadata(path).ok()?.modified().ok()?.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(modified.year()).ok()?,
        modified.month() as u8,
        modified.day() as u8,
        modified.hour() as u8,
        modified.minute() as u8,
        modified.second() as u8,
    )
    .ok()
}

/// Crée `archive` contenant `files` (deflate), chacun sous son seul nom de fichier
pub fn zip_files(archive: &Path, files: &[PathBuf]) -> Result<ArchiveInfo> {
    let out = File::create(archive)
        .with_context(|| format!("Cannot create archive {}", archive.display()))?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let mut entries = Vec::with_capacity(files.len());

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid file name: {}", path.display()))?
            .to_string();
        let len = std::fs::metadata(path)
            .with_context(|| format!("Cannot read {}", path.display()))?
            .len();

        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(len >= u32::MAX as u64);
        if let Some(ts) = zip_timestamp(path) {
            options = options.last_modified_time(ts);
        }

        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Cannot add {} to {}", name, archive.display()))?;
        let mut input =
            File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        std::io::copy(&mut input, &mut zip)
            .with_context(|| format!("Cannot write {} to {}", name, archive.display()))?;

        debug!(archive = %archive.display(), entry = %name, bytes = len, "Added file");
        entries.push(name);
    }

    zip.finish()
        .with_context(|| format!("Cannot finalize archive {}", archive.display()))?;

    let size = std::fs::metadata(archive)?.len();
    let blake3 = compute_file_checksum(archive)?;
    info!(archive = %archive.display(), entries = entries.len(), size, "Archive written");

    Ok(ArchiveInfo {
        path: archive.to_path_buf(),
        size,
        blake3,
        entries,
    })
}

/// Calcule le checksum blake3 d'un fichier
pub fn compute_file_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536]; // 64KB buffer

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
