//! Conversion des géométries `geo` en enregistrements Shapefile

use std::io::{self, Write};

use geo::orient::{Direction, Orient};
use geo::{Coord, Geometry, LineString, Polygon, Rect};

use crate::Gpkg2ShpError;

/// Types de formes Shapefile gérés (2D uniquement)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Null,
    Point,
    PolyLine,
    Polygon,
    MultiPoint,
}

impl ShapeType {
    /// Code numérique du format
    pub fn code(self) -> i32 {
        match self {
            ShapeType::Null => 0,
            ShapeType::Point => 1,
            ShapeType::PolyLine => 3,
            ShapeType::Polygon => 5,
            ShapeType::MultiPoint => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShapeType::Null => "Null",
            ShapeType::Point => "Point",
            ShapeType::PolyLine => "PolyLine",
            ShapeType::Polygon => "Polygon",
            ShapeType::MultiPoint => "MultiPoint",
        }
    }

    /// Type Shapefile correspondant à un `geometry_type_name` GeoPackage
    ///
    /// `GEOMETRY` et `GEOMETRYCOLLECTION` ne fixent pas de type: il sera pris
    /// sur la première géométrie non nulle.
    pub fn from_gpkg_type_name(name: &str) -> Option<ShapeType> {
        match name.trim().to_ascii_uppercase().as_str() {
            "POINT" => Some(ShapeType::Point),
            "MULTIPOINT" => Some(ShapeType::MultiPoint),
            "LINESTRING" | "MULTILINESTRING" | "CURVE" | "MULTICURVE" => Some(ShapeType::PolyLine),
            "POLYGON" | "MULTIPOLYGON" | "SURFACE" | "MULTISURFACE" => Some(ShapeType::Polygon),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShapeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Un enregistrement géométrique prêt à être écrit
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Null,
    Point(Coord),
    MultiPoint(Vec<Coord>),
    /// Parties (lignes)
    PolyLine(Vec<Vec<Coord>>),
    /// Anneaux: extérieurs en sens horaire, trous en sens anti-horaire
    Polygon(Vec<Vec<Coord>>),
}

impl Shape {
    /// Convertit une géométrie dans son type Shapefile naturel
    pub fn from_geometry(geometry: &Geometry) -> Result<Shape, Gpkg2ShpError> {
        Ok(match geometry {
            Geometry::Point(p) => Shape::Point(p.0),
            Geometry::MultiPoint(mp) => Shape::MultiPoint(mp.0.iter().map(|p| p.0).collect()),
            Geometry::Line(line) => Shape::PolyLine(vec![vec![line.start, line.end]]),
            Geometry::LineString(ls) => Shape::PolyLine(non_empty_parts([ls])),
            Geometry::MultiLineString(mls) => Shape::PolyLine(non_empty_parts(mls.0.iter())),
            Geometry::Polygon(p) => Shape::Polygon(polygon_rings(p)),
            Geometry::MultiPolygon(mp) => {
                Shape::Polygon(mp.0.iter().flat_map(polygon_rings).collect())
            }
            Geometry::Rect(r) => Shape::Polygon(polygon_rings(&r.to_polygon())),
            Geometry::Triangle(t) => Shape::Polygon(polygon_rings(&t.to_polygon())),
            Geometry::GeometryCollection(gc) => {
                let mut merged: Option<Shape> = None;
                for member in &gc.0 {
                    let shape = Shape::from_geometry(member)?;
                    merged = Some(match merged {
                        None => shape,
                        Some(acc) => acc.merge(shape).ok_or_else(|| {
                            Gpkg2ShpError::UnsupportedGeometry(
                                "heterogeneous GeometryCollection".to_string(),
                            )
                        })?,
                    });
                }
                merged.unwrap_or(Shape::Null)
            }
        })
    }

    /// Convertit une géométrie vers le type imposé par la couche
    pub fn for_layer(
        geometry: Option<&Geometry>,
        target: ShapeType,
        layer: &str,
    ) -> Result<Shape, Gpkg2ShpError> {
        let shape = match geometry {
            Some(geometry) => Shape::from_geometry(geometry)?,
            None => return Ok(Shape::Null),
        };

        match (shape, target) {
            (Shape::Point(c), ShapeType::MultiPoint) => Ok(Shape::MultiPoint(vec![c])),
            (shape, expected) => match shape.shape_type() {
                ShapeType::Null => Ok(Shape::Null),
                found if found == expected => Ok(shape),
                found => Err(Gpkg2ShpError::MixedGeometry {
                    layer: layer.to_string(),
                    expected: expected.name().to_string(),
                    found: found.name().to_string(),
                }),
            },
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Null => ShapeType::Null,
            Shape::Point(_) => ShapeType::Point,
            Shape::MultiPoint(points) if points.is_empty() => ShapeType::Null,
            Shape::MultiPoint(_) => ShapeType::MultiPoint,
            Shape::PolyLine(parts) if parts.is_empty() => ShapeType::Null,
            Shape::PolyLine(_) => ShapeType::PolyLine,
            Shape::Polygon(rings) if rings.is_empty() => ShapeType::Null,
            Shape::Polygon(_) => ShapeType::Polygon,
        }
    }

    /// Fusionne deux formes de même famille (collections)
    fn merge(self, other: Shape) -> Option<Shape> {
        match (self, other) {
            (Shape::Null, s) | (s, Shape::Null) => Some(s),
            (Shape::Point(a), Shape::Point(b)) => Some(Shape::MultiPoint(vec![a, b])),
            (Shape::Point(a), Shape::MultiPoint(mut b)) => {
                b.insert(0, a);
                Some(Shape::MultiPoint(b))
            }
            (Shape::MultiPoint(mut a), Shape::Point(b)) => {
                a.push(b);
                Some(Shape::MultiPoint(a))
            }
            (Shape::MultiPoint(mut a), Shape::MultiPoint(b)) => {
                a.extend(b);
                Some(Shape::MultiPoint(a))
            }
            (Shape::PolyLine(mut a), Shape::PolyLine(b)) => {
                a.extend(b);
                Some(Shape::PolyLine(a))
            }
            (Shape::Polygon(mut a), Shape::Polygon(b)) => {
                a.extend(b);
                Some(Shape::Polygon(a))
            }
            _ => None,
        }
    }

    fn points(&self) -> Box<dyn Iterator<Item = &Coord> + '_> {
        match self {
            Shape::Null => Box::new(std::iter::empty()),
            Shape::Point(c) => Box::new(std::iter::once(c)),
            Shape::MultiPoint(points) => Box::new(points.iter()),
            Shape::PolyLine(parts) | Shape::Polygon(parts) => Box::new(parts.iter().flatten()),
        }
    }

    /// Emprise de la forme, None pour une forme nulle
    pub fn bbox(&self) -> Option<Rect> {
        let mut points = self.points();
        let first = *points.next()?;
        let (mut min, mut max) = (first, first);
        for c in points {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        Some(Rect::new(min, max))
    }

    /// Taille du contenu de l'enregistrement en octets (hors en-tête de 8 octets)
    pub fn content_len(&self) -> usize {
        match self.shape_type() {
            ShapeType::Null => 4,
            ShapeType::Point => 20,
            ShapeType::MultiPoint => 40 + 16 * self.points().count(),
            ShapeType::PolyLine | ShapeType::Polygon => {
                let parts = match self {
                    Shape::PolyLine(parts) | Shape::Polygon(parts) => parts.len(),
                    _ => 0,
                };
                44 + 4 * parts + 16 * self.points().count()
            }
        }
    }

    /// Écrit le contenu de l'enregistrement (little-endian)
    pub fn write_content<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let shape_type = self.shape_type();
        w.write_all(&shape_type.code().to_le_bytes())?;

        match (shape_type, self) {
            (ShapeType::Null, _) => {}
            (_, Shape::Point(c)) => write_coord(w, c)?,
            (_, Shape::MultiPoint(points)) => {
                write_bbox(w, self.bbox())?;
                w.write_all(&(points.len() as i32).to_le_bytes())?;
                for c in points {
                    write_coord(w, c)?;
                }
            }
            (_, Shape::PolyLine(parts)) | (_, Shape::Polygon(parts)) => {
                write_bbox(w, self.bbox())?;
                let n_points: usize = parts.iter().map(Vec::len).sum();
                w.write_all(&(parts.len() as i32).to_le_bytes())?;
                w.write_all(&(n_points as i32).to_le_bytes())?;

                let mut start = 0i32;
                for part in parts {
                    w.write_all(&start.to_le_bytes())?;
                    start += part.len() as i32;
                }
                for c in parts.iter().flatten() {
                    write_coord(w, c)?;
                }
            }
            (_, Shape::Null) => {}
        }
        Ok(())
    }
}

fn non_empty_parts<'a>(lines: impl IntoIterator<Item = &'a LineString>) -> Vec<Vec<Coord>> {
    lines
        .into_iter()
        .filter(|ls| !ls.0.is_empty())
        .map(|ls| ls.0.clone())
        .collect()
}

/// Anneaux d'un polygone dans la convention Shapefile
fn polygon_rings(polygon: &Polygon) -> Vec<Vec<Coord>> {
    if polygon.exterior().0.is_empty() {
        return Vec::new();
    }
    let oriented = polygon.orient(Direction::Reversed);
    std::iter::once(oriented.exterior())
        .chain(oriented.interiors())
        .filter(|ring| !ring.0.is_empty())
        .map(|ring| ring.0.clone())
        .collect()
}

fn write_coord<W: Write>(w: &mut W, c: &Coord) -> io::Result<()> {
    w.write_all(&c.x.to_le_bytes())?;
    w.write_all(&c.y.to_le_bytes())
}

/// Écrit Xmin, Ymin, Xmax, Ymax
pub(crate) fn write_bbox<W: Write>(w: &mut W, bbox: Option<Rect>) -> io::Result<()> {
    let (min, max) = bbox
        .map(|r| (r.min(), r.max()))
        .unwrap_or((Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }));
    for v in [min.x, min.y, max.x, max.y] {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, MultiPolygon};

    /// Aire signée (positive = sens anti-horaire)
    fn signed_area(ring: &[Coord]) -> f64 {
        ring.windows(2)
            .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
            .sum::<f64>()
            / 2.0
    }

    #[test]
    fn test_polygon_ring_orientation() {
        // Extérieur anti-horaire et trou horaire en entrée
        let poly = polygon!(
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
            ],
            interiors: [
                [
                    (x: 2.0, y: 2.0),
                    (x: 2.0, y: 4.0),
                    (x: 4.0, y: 4.0),
                    (x: 4.0, y: 2.0),
                ],
            ],
        );

        let shape = Shape::from_geometry(&Geometry::Polygon(poly)).unwrap();
        let Shape::Polygon(rings) = shape else {
            panic!("expected polygon");
        };
        assert_eq!(rings.len(), 2);
        assert!(signed_area(&rings[0]) < 0.0, "exterior must be clockwise");
        assert!(signed_area(&rings[1]) > 0.0, "hole must be counter-clockwise");
        // Anneaux fermés
        assert_eq!(rings[0].first(), rings[0].last());
    }

    #[test]
    fn test_multipolygon_parts() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let b = polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0)];
        let shape = Shape::from_geometry(&Geometry::MultiPolygon(MultiPolygon(vec![a, b]))).unwrap();

        assert_eq!(shape.shape_type(), ShapeType::Polygon);
        // 2 parties de 4 points (anneaux fermés)
        assert_eq!(shape.content_len(), 44 + 4 * 2 + 16 * 8);

        let bbox = shape.bbox().unwrap();
        assert_eq!(bbox.min(), Coord { x: 0.0, y: 0.0 });
        assert_eq!(bbox.max(), Coord { x: 6.0, y: 6.0 });

        let mut buf = Vec::new();
        shape.write_content(&mut buf).unwrap();
        assert_eq!(buf.len(), shape.content_len());
        assert_eq!(i32::from_le_bytes(buf[0..4].try_into().unwrap()), 5);
        // nParts, nPoints, puis index de début des parties
        assert_eq!(i32::from_le_bytes(buf[36..40].try_into().unwrap()), 2);
        assert_eq!(i32::from_le_bytes(buf[40..44].try_into().unwrap()), 8);
        assert_eq!(i32::from_le_bytes(buf[44..48].try_into().unwrap()), 0);
        assert_eq!(i32::from_le_bytes(buf[48..52].try_into().unwrap()), 4);
    }

    #[test]
    fn test_point_and_polyline_content() {
        let point = Shape::from_geometry(&Geometry::Point(point!(x: 1.5, y: -2.0))).unwrap();
        let mut buf = Vec::new();
        point.write_content(&mut buf).unwrap();
        assert_eq!(buf.len(), 20);
        assert_eq!(f64::from_le_bytes(buf[4..12].try_into().unwrap()), 1.5);

        let line = Shape::from_geometry(&Geometry::LineString(line_string![
            (x: 0.0, y: 0.0),
            (x: 3.0, y: 4.0),
        ]))
        .unwrap();
        assert_eq!(line.shape_type(), ShapeType::PolyLine);
        assert_eq!(line.content_len(), 44 + 4 + 32);
    }

    #[test]
    fn test_for_layer_type_checks() {
        let point = Geometry::Point(point!(x: 1.0, y: 1.0));
        let as_multi = Shape::for_layer(Some(&point), ShapeType::MultiPoint, "l").unwrap();
        assert_eq!(as_multi, Shape::MultiPoint(vec![Coord { x: 1.0, y: 1.0 }]));

        let err = Shape::for_layer(Some(&point), ShapeType::Polygon, "l").unwrap_err();
        assert!(matches!(err, Gpkg2ShpError::MixedGeometry { .. }));

        assert_eq!(
            Shape::for_layer(None, ShapeType::Polygon, "l").unwrap(),
            Shape::Null
        );
    }

    #[test]
    fn test_null_shape_content() {
        let mut buf = Vec::new();
        Shape::Null.write_content(&mut buf).unwrap();
        assert_eq!(buf, 0i32.to_le_bytes());
        assert_eq!(Shape::Null.content_len(), 4);
        assert!(Shape::Null.bbox().is_none());
    }

    #[test]
    fn test_from_gpkg_type_name() {
        assert_eq!(
            ShapeType::from_gpkg_type_name("MULTIPOLYGON"),
            Some(ShapeType::Polygon)
        );
        assert_eq!(
            ShapeType::from_gpkg_type_name("point"),
            Some(ShapeType::Point)
        );
        assert_eq!(ShapeType::from_gpkg_type_name("GEOMETRY"), None);
    }
}
