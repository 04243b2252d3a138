//! Types de données pour le crate gpkg2shp

use geo::{Geometry, Rect};
use std::path::PathBuf;

use crate::shp::ShapeType;

/// Valeur d'un attribut lue depuis le GeoPackage
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Type DBF d'un champ, avec sa largeur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `C`: texte, largeur en octets (1..=254)
    Character { width: u8 },
    /// `N` sans décimales
    Integer { width: u8 },
    /// `N` avec décimales
    Double { width: u8, decimals: u8 },
    /// `L`: T/F/?
    Logical,
    /// `D`: YYYYMMDD
    Date,
}

impl FieldKind {
    /// Caractère de type du descripteur DBF
    pub fn type_char(&self) -> u8 {
        match self {
            FieldKind::Character { .. } => b'C',
            FieldKind::Integer { .. } | FieldKind::Double { .. } => b'N',
            FieldKind::Logical => b'L',
            FieldKind::Date => b'D',
        }
    }

    /// Largeur du champ en octets
    pub fn width(&self) -> u8 {
        match *self {
            FieldKind::Character { width } => width,
            FieldKind::Integer { width } => width,
            FieldKind::Double { width, .. } => width,
            FieldKind::Logical => 1,
            FieldKind::Date => 8,
        }
    }

    /// Nombre de décimales
    pub fn decimals(&self) -> u8 {
        match *self {
            FieldKind::Double { decimals, .. } => decimals,
            _ => 0,
        }
    }
}

/// Définition d'une colonne de la table attributaire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Nom DBF (10 caractères ASCII max)
    pub name: String,

    /// Type et largeur
    pub kind: FieldKind,
}

/// Un enregistrement: géométrie optionnelle et valeurs dans l'ordre des champs
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub values: Vec<FieldValue>,
}

/// Résultat d'un SELECT sur une table GeoPackage
#[derive(Debug)]
pub struct Layer {
    /// Nom de la table source
    pub name: String,

    /// Type déclaré dans gpkg_geometry_columns (ex: "MULTIPOLYGON")
    pub geometry_type: String,

    /// Champs renommés, dans l'ordre du SELECT
    pub fields: Vec<FieldDef>,

    /// Enregistrements dans l'ordre d'insertion
    pub features: Vec<Feature>,

    /// Définition WKT du système de coordonnées (None si non défini)
    pub srs_wkt: Option<String>,
}

/// Bilan de l'export d'une couche en Shapefile
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Nombre d'enregistrements écrits
    pub features: usize,

    /// Type de géométrie du Shapefile
    pub shape_type: ShapeType,

    /// Emprise des géométries non nulles
    pub bbox: Option<Rect>,

    /// Fichiers écrits (shp, shx, dbf, puis prj et qix si présents)
    pub files: Vec<PathBuf>,
}
