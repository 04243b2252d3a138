//! Écriture ESRI Shapefile: .shp, .shx, .dbf, .prj et index .qix

pub mod dbf;
pub mod qix;
pub mod shape;
pub mod writer;

pub use shape::{Shape, ShapeType};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use encoding_rs::Encoding;
use geo::Rect;
use tracing::{debug, info, warn};

use crate::types::{ExportSummary, Layer};
use crate::Gpkg2ShpError;

/// Extensions des fichiers d'un Shapefile, dans l'ordre d'écriture
pub const SIDECAR_EXTENSIONS: [&str; 5] = ["shp", "shx", "dbf", "prj", "qix"];

/// Options d'écriture
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Encodage des textes du .dbf (mono-octet)
    pub encoding: &'static Encoding,

    /// Construire l'index spatial .qix
    pub spatial_index: bool,

    /// Profondeur de l'index (None: automatique)
    pub index_depth: Option<u32>,

    /// Date de mise à jour inscrite dans l'en-tête .dbf
    pub date: NaiveDate,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::WINDOWS_1252,
            spatial_index: true,
            index_depth: None,
            date: Local::now().date_naive(),
        }
    }
}

/// Chemins des cinq fichiers d'un Shapefile
pub fn shapefile_paths(dir: &Path, basename: &str) -> Vec<PathBuf> {
    SIDECAR_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", basename, ext)))
        .collect()
}

/// Type de la couche: déclaré, sinon déduit des géométries
///
/// Sans type déclaré, le type est celui de la première géométrie non nulle,
/// promu en MultiPoint si des points et des multipoints se côtoient.
fn layer_shape_type(layer: &Layer) -> Result<ShapeType, Gpkg2ShpError> {
    if let Some(shape_type) = ShapeType::from_gpkg_type_name(&layer.geometry_type) {
        return Ok(shape_type);
    }

    let mut found = ShapeType::Null;
    for geometry in layer.features.iter().filter_map(|f| f.geometry.as_ref()) {
        let shape_type = Shape::from_geometry(geometry)?.shape_type();
        found = match (found, shape_type) {
            (ShapeType::Null, t) => t,
            (ShapeType::Point, ShapeType::MultiPoint) => ShapeType::MultiPoint,
            (current, _) => current,
        };
        // Seul un Point peut encore être promu
        if !matches!(found, ShapeType::Null | ShapeType::Point) {
            break;
        }
    }
    Ok(found)
}

/// Exporte une couche vers `dir/basename.{shp,shx,dbf,prj,qix}`
pub fn export_layer(
    layer: &Layer,
    dir: &Path,
    basename: &str,
    options: &WriteOptions,
) -> Result<ExportSummary, Gpkg2ShpError> {
    let shape_type = layer_shape_type(layer)?;

    let paths = shapefile_paths(dir, basename);
    let (shp_path, shx_path, dbf_path, prj_path, qix_path) =
        (&paths[0], &paths[1], &paths[2], &paths[3], &paths[4]);
    let mut files = vec![shp_path.clone(), shx_path.clone(), dbf_path.clone()];

    // Une forme à la fois: seules les emprises sont conservées pour l'index
    let mut shp_writer = writer::ShpWriter::create(shp_path, shx_path, shape_type)?;
    let mut bboxes: Vec<Option<Rect>> = Vec::with_capacity(layer.features.len());
    for feature in &layer.features {
        let shape = Shape::for_layer(feature.geometry.as_ref(), shape_type, &layer.name)?;
        bboxes.push(shp_writer.write_shape(&shape)?);
    }
    let (records, bbox) = shp_writer.finish()?;
    debug!(path = %shp_path.display(), records, "Wrote shp/shx");

    let fields = dbf::fit_fields(&layer.fields, &layer.features, options.encoding);
    let mut dbf_writer = BufWriter::new(File::create(dbf_path)?);
    dbf::write_dbf(
        &mut dbf_writer,
        &fields,
        &layer.features,
        options.encoding,
        options.date,
    )?;
    dbf_writer.flush()?;
    debug!(path = %dbf_path.display(), fields = fields.len(), "Wrote dbf");

    match &layer.srs_wkt {
        Some(wkt) => {
            std::fs::write(prj_path, wkt)?;
            files.push(prj_path.clone());
        }
        None => warn!(layer = %layer.name, "No spatial reference system, .prj not written"),
    }

    if options.spatial_index {
        let tree = qix::QuadTree::build(bbox, &bboxes, options.index_depth);
        let mut qix_writer = BufWriter::new(File::create(qix_path)?);
        tree.write(&mut qix_writer)?;
        qix_writer.flush()?;
        debug!(
            path = %qix_path.display(),
            depth = tree.max_depth(),
            nodes = tree.node_count(),
            "Wrote spatial index"
        );
        files.push(qix_path.clone());
    }

    info!(
        layer = %layer.name,
        basename,
        features = records,
        shape_type = %shape_type,
        "Exported shapefile"
    );

    Ok(ExportSummary {
        features: records,
        shape_type,
        bbox,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Feature;
    use geo::{point, Geometry, MultiPoint};

    fn untyped_layer(geometries: Vec<Option<Geometry>>) -> Layer {
        Layer {
            name: "sites".to_string(),
            geometry_type: "GEOMETRY".to_string(),
            fields: Vec::new(),
            features: geometries
                .into_iter()
                .map(|geometry| Feature {
                    geometry,
                    values: Vec::new(),
                })
                .collect(),
            srs_wkt: None,
        }
    }

    #[test]
    fn test_layer_shape_type_promotes_points() {
        let layer = untyped_layer(vec![
            None,
            Some(point!(x: 1.0, y: 1.0).into()),
            Some(MultiPoint(vec![point!(x: 2.0, y: 2.0), point!(x: 3.0, y: 3.0)]).into()),
        ]);
        assert_eq!(layer_shape_type(&layer).unwrap(), ShapeType::MultiPoint);

        let points = untyped_layer(vec![Some(point!(x: 1.0, y: 1.0).into())]);
        assert_eq!(layer_shape_type(&points).unwrap(), ShapeType::Point);

        assert_eq!(layer_shape_type(&untyped_layer(vec![None])).unwrap(), ShapeType::Null);
    }

    #[test]
    fn test_export_mixed_points_as_multipoint() {
        let dir = tempfile::tempdir().unwrap();
        let layer = untyped_layer(vec![
            Some(point!(x: 1.0, y: 1.0).into()),
            Some(MultiPoint(vec![point!(x: 2.0, y: 2.0), point!(x: 3.0, y: 3.0)]).into()),
        ]);

        let summary = export_layer(&layer, dir.path(), "sites", &WriteOptions::default()).unwrap();
        assert_eq!(summary.shape_type, ShapeType::MultiPoint);
        assert_eq!(summary.features, 2);
        // Pas de .prj sans SRS
        assert_eq!(summary.files.len(), 4);

        let shp = std::fs::read(dir.path().join("sites.shp")).unwrap();
        assert_eq!(i32::from_le_bytes(shp[32..36].try_into().unwrap()), 8);
        // 100 + (8 + 40 + 16) + (8 + 40 + 32)
        assert_eq!(shp.len(), 244);
        assert_eq!(
            i32::from_be_bytes(shp[24..28].try_into().unwrap()) as usize * 2,
            shp.len()
        );
    }
}
