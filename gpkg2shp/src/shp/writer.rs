//! Écriture des fichiers .shp et .shx

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use geo::{Coord, Rect};

use super::shape::{write_bbox, Shape, ShapeType};
use crate::Gpkg2ShpError;

/// Code de fichier en tête de .shp et .shx
const FILE_CODE: i32 = 9994;

/// Version du format
const VERSION: i32 = 1000;

/// Taille de l'en-tête commun aux .shp et .shx
pub const HEADER_LEN: usize = 100;

/// Taille d'un en-tête d'enregistrement (.shp) et d'une entrée d'index (.shx)
const RECORD_HEADER_LEN: usize = 8;

/// Limite des offsets signés 32 bits exprimés en octets
const MAX_FILE_LEN: usize = i32::MAX as usize;

/// Étend une emprise avec une autre
fn merge_bbox(acc: Option<Rect>, r: Rect) -> Rect {
    match acc {
        None => r,
        Some(a) => Rect::new(
            Coord {
                x: a.min().x.min(r.min().x),
                y: a.min().y.min(r.min().y),
            },
            Coord {
                x: a.max().x.max(r.max().x),
                y: a.max().y.max(r.max().y),
            },
        ),
    }
}

/// En-tête de 100 octets; longueur en mots de 16 bits
fn write_header<W: Write>(
    w: &mut W,
    file_len: usize,
    shape_type: ShapeType,
    bbox: Option<Rect>,
) -> std::io::Result<()> {
    w.write_all(&FILE_CODE.to_be_bytes())?;
    w.write_all(&[0u8; 20])?;
    w.write_all(&((file_len / 2) as i32).to_be_bytes())?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&shape_type.code().to_le_bytes())?;
    write_bbox(w, bbox)?;
    // Zmin, Zmax, Mmin, Mmax
    w.write_all(&[0u8; 32])?;
    Ok(())
}

/// Écriture en flux du couple .shp/.shx
///
/// Les en-têtes sont réécrits par `finish`, une fois la taille et
/// l'emprise connues: une seule forme est en mémoire à la fois.
pub struct ShpWriter {
    shp: BufWriter<File>,
    shx: BufWriter<File>,
    shp_path: PathBuf,
    shape_type: ShapeType,
    offset: usize,
    records: usize,
    bbox: Option<Rect>,
}

impl ShpWriter {
    /// Crée les deux fichiers pour des formes de type `shape_type`
    pub fn create(
        shp_path: &Path,
        shx_path: &Path,
        shape_type: ShapeType,
    ) -> Result<Self, Gpkg2ShpError> {
        let mut shp = BufWriter::new(File::create(shp_path)?);
        let mut shx = BufWriter::new(File::create(shx_path)?);

        // Réservé, réécrit par finish()
        write_header(&mut shp, HEADER_LEN, shape_type, None)?;
        write_header(&mut shx, HEADER_LEN, shape_type, None)?;

        Ok(Self {
            shp,
            shx,
            shp_path: shp_path.to_path_buf(),
            shape_type,
            offset: HEADER_LEN,
            records: 0,
            bbox: None,
        })
    }

    /// Ajoute un enregistrement, retourne l'emprise de la forme
    pub fn write_shape(&mut self, shape: &Shape) -> Result<Option<Rect>, Gpkg2ShpError> {
        let content_len = shape.content_len();
        let record_len = RECORD_HEADER_LEN + content_len;
        if self.offset + record_len > MAX_FILE_LEN {
            return Err(Gpkg2ShpError::FileTooLarge(self.shp_path.display().to_string()));
        }

        let content_words = (content_len / 2) as i32;
        self.records += 1;

        self.shp.write_all(&(self.records as i32).to_be_bytes())?;
        self.shp.write_all(&content_words.to_be_bytes())?;
        shape.write_content(&mut self.shp)?;

        self.shx.write_all(&((self.offset / 2) as i32).to_be_bytes())?;
        self.shx.write_all(&content_words.to_be_bytes())?;

        self.offset += record_len;

        let bbox = shape.bbox();
        if let Some(r) = bbox {
            self.bbox = Some(merge_bbox(self.bbox, r));
        }
        Ok(bbox)
    }

    /// Réécrit les en-têtes; retourne le nombre d'enregistrements et l'emprise globale
    pub fn finish(mut self) -> Result<(usize, Option<Rect>), Gpkg2ShpError> {
        let shx_len = HEADER_LEN + RECORD_HEADER_LEN * self.records;

        self.shp.seek(SeekFrom::Start(0))?;
        write_header(&mut self.shp, self.offset, self.shape_type, self.bbox)?;
        self.shx.seek(SeekFrom::Start(0))?;
        write_header(&mut self.shx, shx_len, self.shape_type, self.bbox)?;

        self.shp.flush()?;
        self.shx.flush()?;

        Ok((self.records, self.bbox))
    }
}
