//! Écriture de la table attributaire dBase III (.dbf)

use std::io::Write;

use chrono::{Datelike, NaiveDate};
use encoding_rs::Encoding;
use tracing::warn;

use crate::gpkg::query::is_valid_dbf_name;
use crate::types::{Feature, FieldDef, FieldKind, FieldValue};
use crate::Gpkg2ShpError;

/// Nombre maximal de champs d'une table dBase
const MAX_FIELDS: usize = 255;

/// Identifiant de pilote de langue (LDID) pour les encodages mono-octet gérés
pub fn language_driver_id(encoding: &'static Encoding) -> Option<u8> {
    let ldid = match encoding.name() {
        "windows-1252" => 0x57,
        "windows-1250" => 0xC8,
        "windows-1251" => 0xC9,
        "windows-1254" => 0xCA,
        "windows-1253" => 0xCB,
        "windows-1255" => 0x7D,
        "windows-1256" => 0x7E,
        _ => return None,
    };
    Some(ldid)
}

/// Encode une chaîne; les caractères non représentables deviennent '?'
fn encode_text(value: &str, encoding: &'static Encoding) -> Vec<u8> {
    let (bytes, _, had_errors) = encoding.encode(value);
    if !had_errors {
        return bytes.into_owned();
    }

    let mut out = Vec::with_capacity(value.len());
    let mut buf = [0u8; 4];
    for c in value.chars() {
        let (bytes, _, had_errors) = encoding.encode(c.encode_utf8(&mut buf));
        if had_errors {
            out.push(b'?');
        } else {
            out.extend_from_slice(&bytes);
        }
    }
    out
}

fn value_as_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Real(r) => Some(r.to_string()),
        FieldValue::Text(s) => Some(s.clone()),
    }
}

fn value_as_i64(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Integer(i) => Some(*i),
        // Entiers stockés en réel uniquement: pas d'arrondi
        FieldValue::Real(r) if r.fract() == 0.0 && r.abs() < i64::MAX as f64 => Some(*r as i64),
        FieldValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_f64(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Integer(i) => Some(*i as f64),
        FieldValue::Real(r) if r.is_finite() => Some(*r),
        FieldValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_logical(value: &FieldValue) -> Option<bool> {
    match value {
        FieldValue::Integer(i) => Some(*i != 0),
        FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "1" => Some(true),
            "f" | "false" | "n" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn value_as_date(value: &FieldValue) -> Option<NaiveDate> {
    match value {
        FieldValue::Text(s) => {
            let s = s.trim();
            let day = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(day, "%Y%m%d"))
                .ok()
        }
        _ => None,
    }
}

/// Rend un réel dans la largeur du champ, en réduisant les décimales si besoin
fn format_double(value: f64, width: usize, decimals: usize) -> Option<String> {
    (0..=decimals)
        .rev()
        .map(|d| format!("{:>width$.prec$}", value, width = width, prec = d))
        .find(|s| s.len() <= width)
}

/// Ajuste les largeurs déclarées aux valeurs réellement présentes
pub fn fit_fields(
    fields: &[FieldDef],
    features: &[Feature],
    encoding: &'static Encoding,
) -> Vec<FieldDef> {
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let values = features.iter().map(|f| &f.values[i]);
            let kind = match field.kind {
                FieldKind::Character { width } => {
                    let longest = values
                        .filter_map(value_as_text)
                        .map(|s| encode_text(&s, encoding).len())
                        .max()
                        .unwrap_or(1);
                    if longest > width as usize {
                        warn!(
                            field = %field.name,
                            width,
                            longest,
                            "Values longer than the field width will be truncated"
                        );
                    }
                    FieldKind::Character {
                        width: longest.clamp(1, width as usize) as u8,
                    }
                }
                FieldKind::Integer { width } => {
                    let longest = values
                        .filter_map(value_as_i64)
                        .map(|v| v.to_string().len())
                        .max()
                        .unwrap_or(1);
                    FieldKind::Integer {
                        width: longest.clamp(1, width as usize) as u8,
                    }
                }
                other => other,
            };
            FieldDef {
                name: field.name.clone(),
                kind,
            }
        })
        .collect()
}

/// Rend une valeur sur exactement `kind.width()` octets
fn render_value(
    field: &FieldDef,
    value: &FieldValue,
    encoding: &'static Encoding,
) -> Vec<u8> {
    let width = field.kind.width() as usize;

    let rendered: Option<Vec<u8>> = match field.kind {
        FieldKind::Character { .. } => value_as_text(value).map(|s| {
            let mut bytes = encode_text(&s, encoding);
            bytes.truncate(width);
            bytes.resize(width, b' ');
            bytes
        }),
        FieldKind::Integer { .. } => value_as_i64(value)
            .map(|v| format!("{:>width$}", v, width = width))
            .filter(|s| s.len() <= width)
            .map(String::into_bytes),
        FieldKind::Double { decimals, .. } => value_as_f64(value)
            .and_then(|v| format_double(v, width, decimals as usize))
            .map(String::into_bytes),
        FieldKind::Logical => value_as_logical(value).map(|b| vec![if b { b'T' } else { b'F' }]),
        FieldKind::Date => {
            value_as_date(value).map(|d| format!("{:04}{:02}{:02}", d.year(), d.month(), d.day()).into_bytes())
        }
    };

    match rendered {
        Some(bytes) => bytes,
        None => {
            if !matches!(value, FieldValue::Null) {
                warn!(field = %field.name, ?value, "Value cannot be stored in field, written as NULL");
            }
            // Conventions shapelib pour les NULL
            let filler = match field.kind {
                FieldKind::Integer { .. } | FieldKind::Double { .. } => b'*',
                FieldKind::Date => b'0',
                FieldKind::Logical => b'?',
                FieldKind::Character { .. } => b' ',
            };
            vec![filler; width]
        }
    }
}

/// Écrit la table dBase III complète
pub fn write_dbf<W: Write>(
    w: &mut W,
    fields: &[FieldDef],
    features: &[Feature],
    encoding: &'static Encoding,
    date: NaiveDate,
) -> Result<(), Gpkg2ShpError> {
    let ldid = language_driver_id(encoding).ok_or_else(|| Gpkg2ShpError::UnsupportedField {
        field: String::new(),
        reason: format!("no DBF language driver for encoding {}", encoding.name()),
    })?;

    if fields.len() > MAX_FIELDS {
        return Err(Gpkg2ShpError::UnsupportedField {
            field: fields[MAX_FIELDS].name.clone(),
            reason: format!("a DBF holds at most {} fields", MAX_FIELDS),
        });
    }
    for field in fields {
        if !is_valid_dbf_name(&field.name) {
            return Err(Gpkg2ShpError::InvalidFieldName(field.name.clone()));
        }
    }

    let header_len = 32 + 32 * fields.len() + 1;
    let record_len = 1 + fields.iter().map(|f| f.kind.width() as usize).sum::<usize>();

    // En-tête
    let mut header = [0u8; 32];
    header[0] = 0x03;
    header[1] = (date.year() - 1900).clamp(0, 255) as u8;
    header[2] = date.month() as u8;
    header[3] = date.day() as u8;
    header[4..8].copy_from_slice(&(features.len() as u32).to_le_bytes());
    header[8..10].copy_from_slice(&(header_len as u16).to_le_bytes());
    header[10..12].copy_from_slice(&(record_len as u16).to_le_bytes());
    header[29] = ldid;
    w.write_all(&header)?;

    // Descripteurs de champs
    for field in fields {
        let mut descriptor = [0u8; 32];
        let name = field.name.as_bytes();
        descriptor[..name.len()].copy_from_slice(name);
        descriptor[11] = field.kind.type_char();
        descriptor[16] = field.kind.width();
        descriptor[17] = field.kind.decimals();
        w.write_all(&descriptor)?;
    }
    w.write_all(&[0x0D])?;

    // Enregistrements
    let mut record = Vec::with_capacity(record_len);
    for feature in features {
        record.clear();
        record.push(b' ');
        for (field, value) in fields.iter().zip(&feature.values) {
            record.extend_from_slice(&render_value(field, value, encoding));
        }
        w.write_all(&record)?;
    }
    w.write_all(&[0x1A])?;

    Ok(())
}
