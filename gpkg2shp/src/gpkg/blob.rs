//! Décodage des blobs géométriques GeoPackage (en-tête GP + WKB)

use geo::Geometry;
use geozero::wkb::GpkgWkb;
use geozero::ToGeo;

/// Octet des flags dans l'en-tête GeoPackageBinary
const FLAGS_OFFSET: usize = 3;

const FLAG_EMPTY: u8 = 0b0001_0000;

/// Décode un blob GeoPackage en géométrie `geo`
///
/// Retourne `Ok(None)` pour une géométrie vide.
pub fn decode(blob: &[u8]) -> Result<Option<Geometry>, String> {
    if !blob.starts_with(b"GP") || blob.len() <= FLAGS_OFFSET {
        return Err(format!("not a GeoPackage geometry blob ({} bytes)", blob.len()));
    }
    if blob[FLAGS_OFFSET] & FLAG_EMPTY != 0 {
        return Ok(None);
    }

    let geometry = GpkgWkb(blob).to_geo().map_err(|e| format!("WKB: {}", e))?;

    if is_empty(&geometry) {
        return Ok(None);
    }
    Ok(Some(geometry))
}

/// Certains producteurs écrivent des géométries vides sans positionner le flag
fn is_empty(geometry: &Geometry) -> bool {
    match geometry {
        Geometry::MultiPoint(mp) => mp.0.is_empty(),
        Geometry::LineString(ls) => ls.0.is_empty(),
        Geometry::MultiLineString(mls) => mls.0.iter().all(|ls| ls.0.is_empty()),
        Geometry::Polygon(p) => p.exterior().0.is_empty(),
        Geometry::MultiPolygon(mp) => mp.0.iter().all(|p| p.exterior().0.is_empty()),
        Geometry::GeometryCollection(gc) => gc.0.iter().all(is_empty),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Point};

    /// Encode un blob GP little-endian sans enveloppe à partir d'un WKB
    fn gpkg_blob(srs_id: i32, wkb: &[u8]) -> Vec<u8> {
        let mut blob = vec![b'G', b'P', 0, 0b0000_0001];
        blob.extend_from_slice(&srs_id.to_le_bytes());
        blob.extend_from_slice(wkb);
        blob
    }

    fn point_wkb(x: f64, y: f64) -> Vec<u8> {
        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&1u32.to_le_bytes());
        wkb.extend_from_slice(&x.to_le_bytes());
        wkb.extend_from_slice(&y.to_le_bytes());
        wkb
    }

    #[test]
    fn test_decode_point() {
        let blob = gpkg_blob(3005, &point_wkb(1200000.0, 450000.0));
        let geom = decode(&blob).unwrap().unwrap();
        assert_eq!(geom, Geometry::Point(Point::new(1200000.0, 450000.0)));
    }

    #[test]
    fn test_decode_with_envelope() {
        // Enveloppe XY (indicateur 1), en-tête big-endian
        let mut blob = vec![b'G', b'P', 0, 0b0000_0010];
        blob.extend_from_slice(&3005i32.to_be_bytes());
        for v in [0.0f64, 10.0, 0.0, 10.0] {
            blob.extend_from_slice(&v.to_be_bytes());
        }
        blob.extend_from_slice(&point_wkb(5.0, 5.0));

        let geom = decode(&blob).unwrap().unwrap();
        assert_eq!(geom, Geometry::Point(Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_decode_empty() {
        let mut blob = gpkg_blob(3005, &point_wkb(1.0, 1.0));
        blob[FLAGS_OFFSET] |= FLAG_EMPTY;
        assert_eq!(decode(&blob).unwrap(), None);

        // Flag absent mais polygone sans anneau
        let blob = gpkg_blob(3005, &[1, 3, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode(&blob).unwrap(), None);
    }

    #[test]
    fn test_decode_polygon() {
        use geozero::{CoordDimensions, ToWkb};

        let poly: Geometry = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        let wkb = poly.to_wkb(CoordDimensions::xy()).unwrap();
        let decoded = decode(&gpkg_blob(4326, &wkb)).unwrap().unwrap();
        assert_eq!(decoded, poly);
    }

    #[test]
    fn test_decode_errors() {
        assert!(decode(b"GP").is_err());
        assert!(decode(b"XX\0\x01\0\0\0\0").is_err());
        // Enveloppe annoncée mais absente
        assert!(decode(b"GP\0\x03\0\0\0\0").is_err());
        // Indicateur d'enveloppe invalide (5)
        assert!(decode(b"GP\0\x0b\0\0\0\0").is_err());
    }
}
