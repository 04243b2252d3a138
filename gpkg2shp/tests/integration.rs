//! Tests d'intégration: GeoPackage construit à la volée puis exporté en Shapefile

use std::path::Path;

use gpkg2shp::{export_table, ColumnMapping, GeoPackage, Gpkg2ShpError, SelectQuery, WriteOptions};
use rusqlite::{params, Connection};

const BC_ALBERS_WKT: &str = r#"PROJCS["NAD83 / BC Albers",GEOGCS["NAD83",DATUM["North_American_Datum_1983",SPHEROID["GRS 1980",6378137,298.257222101]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Albers_Conic_Equal_Area"],PARAMETER["latitude_of_center",45],PARAMETER["longitude_of_center",-126],PARAMETER["standard_parallel_1",50],PARAMETER["standard_parallel_2",58.5],PARAMETER["false_easting",1000000],PARAMETER["false_northing",0],UNIT["metre",1]]"#;

/// Blob GP little-endian sans enveloppe
fn gpkg_blob(srs_id: i32, wkb: &[u8]) -> Vec<u8> {
    let mut blob = vec![b'G', b'P', 0, 0x01];
    blob.extend_from_slice(&srs_id.to_le_bytes());
    blob.extend_from_slice(wkb);
    blob
}

/// WKB d'un carré (polygone à un anneau)
fn square_wkb(x: f64, y: f64, size: f64) -> Vec<u8> {
    let ring = [
        (x, y),
        (x + size, y),
        (x + size, y + size),
        (x, y + size),
        (x, y),
    ];
    let mut wkb = vec![1u8];
    wkb.extend_from_slice(&3u32.to_le_bytes());
    wkb.extend_from_slice(&1u32.to_le_bytes());
    wkb.extend_from_slice(&(ring.len() as u32).to_le_bytes());
    for (px, py) in ring {
        wkb.extend_from_slice(&px.to_le_bytes());
        wkb.extend_from_slice(&py.to_le_bytes());
    }
    wkb
}

fn create_gpkg(path: &Path, srs_definition: &str) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_spatial_ref_sys (
            srs_name TEXT NOT NULL, srs_id INTEGER PRIMARY KEY, organization TEXT NOT NULL,
            organization_coordsys_id INTEGER NOT NULL, definition TEXT NOT NULL, description TEXT);
         CREATE TABLE gpkg_geometry_columns (
            table_name TEXT NOT NULL, column_name TEXT NOT NULL, geometry_type_name TEXT NOT NULL,
            srs_id INTEGER NOT NULL, z TINYINT NOT NULL, m TINYINT NOT NULL);
         CREATE TABLE designatedlands (
            fid INTEGER PRIMARY KEY AUTOINCREMENT, designatedlands_id INTEGER,
            category TEXT, designation TEXT, bc_boundary TEXT, map_tile TEXT, geom MULTIPOLYGON);
         INSERT INTO gpkg_geometry_columns VALUES ('designatedlands', 'geom', 'MULTIPOLYGON', 3005, 0, 0);",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES ('NAD83 / BC Albers', 3005, 'EPSG', 3005, ?1, NULL)",
        [srs_definition],
    )
    .unwrap();
    conn
}

fn insert_row(conn: &Connection, id: i64, category: &str, geom: Option<Vec<u8>>) {
    conn.execute(
        "INSERT INTO designatedlands (designatedlands_id, category, designation, bc_boundary, map_tile, geom)
         VALUES (?1, ?2, 'park_provincial', 'bc_boundary_land_tiled', '092B044', ?3)",
        params![id, category, geom],
    )
    .unwrap();
}

fn designatedlands_query() -> SelectQuery {
    SelectQuery::new(
        "designatedlands",
        vec![
            ColumnMapping::new("designatedlands_id", "dl_id"),
            ColumnMapping::new("category", "category"),
            ColumnMapping::new("designation", "desig"),
            ColumnMapping::new("bc_boundary", "bc_bound"),
            ColumnMapping::new("map_tile", "map_tile"),
        ],
    )
}

fn dbf_field_names(dbf: &[u8]) -> Vec<String> {
    let header_len = u16::from_le_bytes([dbf[8], dbf[9]]) as usize;
    let n_fields = (header_len - 33) / 32;
    (0..n_fields)
        .map(|i| {
            let name = &dbf[32 + i * 32..32 + i * 32 + 11];
            String::from_utf8_lossy(name)
                .trim_end_matches('\0')
                .to_string()
        })
        .collect()
}

#[test]
fn test_export_designatedlands() {
    let dir = tempfile::tempdir().unwrap();
    let gpkg_path = dir.path().join("designatedlands.gpkg");
    let conn = create_gpkg(&gpkg_path, BC_ALBERS_WKT);
    insert_row(&conn, 1, "01_PPA", Some(gpkg_blob(3005, &square_wkb(1_000_000.0, 500_000.0, 100.0))));
    insert_row(&conn, 2, "02_Protected_Other", None);
    insert_row(&conn, 3, "03_Exclude_1_2_Activities", Some(gpkg_blob(3005, &square_wkb(1_200_000.0, 600_000.0, 50.0))));
    drop(conn);

    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();

    let gpkg = GeoPackage::open(&gpkg_path).unwrap();
    let summary = export_table(
        &gpkg,
        &designatedlands_query(),
        &out,
        "designatedlands",
        &WriteOptions::default(),
    )
    .unwrap();

    assert_eq!(summary.features, 3);
    assert_eq!(summary.shape_type, gpkg2shp::ShapeType::Polygon);
    assert_eq!(summary.files.len(), 5);
    for ext in gpkg2shp::SIDECAR_EXTENSIONS {
        assert!(out.join(format!("designatedlands.{}", ext)).exists(), "missing .{}", ext);
    }

    let bbox = summary.bbox.unwrap();
    assert_eq!(bbox.min().x, 1_000_000.0);
    assert_eq!(bbox.max().y, 600_050.0);

    // En-tête .shp: type polygone, longueur cohérente
    let shp = std::fs::read(out.join("designatedlands.shp")).unwrap();
    assert_eq!(i32::from_le_bytes(shp[32..36].try_into().unwrap()), 5);
    assert_eq!(
        i32::from_be_bytes(shp[24..28].try_into().unwrap()) as usize * 2,
        shp.len()
    );

    // .dbf: 3 enregistrements, colonnes renommées dans l'ordre, LDID cp1252
    let dbf = std::fs::read(out.join("designatedlands.dbf")).unwrap();
    assert_eq!(u32::from_le_bytes(dbf[4..8].try_into().unwrap()), 3);
    assert_eq!(dbf[29], 0x57);
    assert_eq!(
        dbf_field_names(&dbf),
        vec!["dl_id", "category", "desig", "bc_bound", "map_tile"]
    );

    let prj = std::fs::read_to_string(out.join("designatedlands.prj")).unwrap();
    assert!(prj.starts_with("PROJCS[\"NAD83 / BC Albers\""));

    let qix = std::fs::read(out.join("designatedlands.qix")).unwrap();
    assert_eq!(&qix[0..3], b"SQT");
    // Seules les formes non nulles sont indexées
    assert_eq!(i32::from_le_bytes(qix[8..12].try_into().unwrap()), 2);
}

#[test]
fn test_export_without_spatial_index_or_srs() {
    let dir = tempfile::tempdir().unwrap();
    let gpkg_path = dir.path().join("nosrs.gpkg");
    let conn = create_gpkg(&gpkg_path, "undefined");
    insert_row(&conn, 1, "01_PPA", Some(gpkg_blob(3005, &square_wkb(0.0, 0.0, 1.0))));
    drop(conn);

    let gpkg = GeoPackage::open(&gpkg_path).unwrap();
    let options = WriteOptions {
        spatial_index: false,
        ..WriteOptions::default()
    };
    let summary = export_table(&gpkg, &designatedlands_query(), dir.path(), "dl", &options).unwrap();

    assert_eq!(summary.files.len(), 3);
    assert!(!dir.path().join("dl.prj").exists());
    assert!(!dir.path().join("dl.qix").exists());
}

#[test]
fn test_missing_column_fails_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let gpkg_path = dir.path().join("designatedlands.gpkg");
    drop(create_gpkg(&gpkg_path, BC_ALBERS_WKT));

    let gpkg = GeoPackage::open(&gpkg_path).unwrap();
    let query = SelectQuery::new(
        "designatedlands",
        vec![ColumnMapping::new("designation_name", "desig_name")],
    );
    let err = export_table(&gpkg, &query, dir.path(), "dl", &WriteOptions::default()).unwrap_err();

    assert!(matches!(err, Gpkg2ShpError::MissingColumn { .. }));
    assert!(!dir.path().join("dl.shp").exists());
}

#[test]
fn test_missing_table() {
    let dir = tempfile::tempdir().unwrap();
    let gpkg_path = dir.path().join("designatedlands.gpkg");
    drop(create_gpkg(&gpkg_path, BC_ALBERS_WKT));

    let gpkg = GeoPackage::open(&gpkg_path).unwrap();
    let query = SelectQuery::new("designatedlands_overlaps", vec![]);
    let err = gpkg.check_query(&query).unwrap_err();
    assert!(matches!(err, Gpkg2ShpError::MissingTable(ref t) if t == "designatedlands_overlaps"));
}

#[test]
fn test_not_a_geopackage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.sqlite");
    Connection::open(&path)
        .unwrap()
        .execute_batch("CREATE TABLE t (a INTEGER);")
        .unwrap();

    let err = GeoPackage::open(&path).unwrap_err();
    assert!(matches!(err, Gpkg2ShpError::InvalidGeoPackage { .. }));
}

#[test]
fn test_invalid_field_name_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gpkg_path = dir.path().join("designatedlands.gpkg");
    drop(create_gpkg(&gpkg_path, BC_ALBERS_WKT));

    let gpkg = GeoPackage::open(&gpkg_path).unwrap();
    let query = SelectQuery::new(
        "designatedlands",
        vec![ColumnMapping::new("designatedlands_id", "designatedlands_id")],
    );
    let err = gpkg.check_query(&query).unwrap_err();
    assert!(matches!(err, Gpkg2ShpError::InvalidFieldName(_)));
}

/// Exporte une table dont la colonne INTEGER reçoit les valeurs SQL brutes `ids`
fn export_raw_ids(dir: &Path, ids: &[&str]) -> Vec<u8> {
    let gpkg_path = dir.join("designatedlands.gpkg");
    let conn = create_gpkg(&gpkg_path, BC_ALBERS_WKT);
    for id in ids {
        conn.execute(
            &format!(
                "INSERT INTO designatedlands (designatedlands_id, category, geom) VALUES ({}, '01_PPA', ?1)",
                id
            ),
            [gpkg_blob(3005, &square_wkb(0.0, 0.0, 1.0))],
        )
        .unwrap();
    }
    drop(conn);

    let gpkg = GeoPackage::open(&gpkg_path).unwrap();
    let query = SelectQuery::new(
        "designatedlands",
        vec![ColumnMapping::new("designatedlands_id", "dl_id")],
    );
    let out = dir.join("out");
    std::fs::create_dir(&out).unwrap();
    export_table(&gpkg, &query, &out, "designatedlands", &WriteOptions::default()).unwrap();
    std::fs::read(out.join("designatedlands.dbf")).unwrap()
}

/// Valeurs du premier champ, enregistrement par enregistrement
fn first_field_values(dbf: &[u8]) -> Vec<String> {
    let n_records = u32::from_le_bytes(dbf[4..8].try_into().unwrap()) as usize;
    let header_len = u16::from_le_bytes([dbf[8], dbf[9]]) as usize;
    let record_len = u16::from_le_bytes([dbf[10], dbf[11]]) as usize;
    let width = dbf[32 + 16] as usize;
    (0..n_records)
        .map(|i| {
            let start = header_len + i * record_len + 1;
            String::from_utf8_lossy(&dbf[start..start + width]).trim().to_string()
        })
        .collect()
}

#[test]
fn test_integer_column_holding_reals_keeps_decimals() {
    let dir = tempfile::tempdir().unwrap();
    let dbf = export_raw_ids(dir.path(), &["3.7", "12"]);

    // Type N avec décimales
    assert_eq!(dbf[32 + 11], b'N');
    assert!(dbf[32 + 17] > 0);

    let values: Vec<f64> = first_field_values(&dbf)
        .iter()
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(values, [3.7, 12.0]);
}

#[test]
fn test_integer_column_holding_text_written_as_text() {
    let dir = tempfile::tempdir().unwrap();
    let dbf = export_raw_ids(dir.path(), &["3.7", "'8-300'", "NULL"]);

    assert_eq!(dbf[32 + 11], b'C');
    assert_eq!(first_field_values(&dbf), ["3.7", "8-300", ""]);
}
