//! Casting resolved text to declared field types

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::engine::resolver::WorkingData;
use crate::engine::Diagnostic;
use crate::error::CastError;
use crate::plan::TypeName;

/// Final typed output of one pass, keyed by field name.
pub type Record = BTreeMap<String, FieldValue>;

/// A typed record value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
    /// Integer cast of non-numeric text; serializes as null
    NotANumber,
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        match self {
            FieldValue::NotANumber => true,
            FieldValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null | FieldValue::NotANumber => serializer.serialize_none(),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Integer(n) => serializer.serialize_i64(*n),
            FieldValue::Float(f) => serializer.serialize_f64(*f),
            FieldValue::Boolean(b) => serializer.serialize_bool(*b),
            FieldValue::Bytes(bytes) => serializer.collect_seq(bytes),
        }
    }
}

/// Convert raw text to `type_name`. Unknown type names pass the text through.
pub fn cast(value: &str, type_name: &TypeName) -> Result<FieldValue, CastError> {
    match type_name {
        TypeName::String | TypeName::Text | TypeName::Ascii | TypeName::Other(_) => {
            Ok(FieldValue::Text(value.to_string()))
        }
        TypeName::Decimal => parse_decimal(value),
        TypeName::Integer | TypeName::Number => Ok(parse_integer(value)),
        TypeName::Float | TypeName::Double => parse_float(value, value.trim()),
        TypeName::Bytes => Ok(FieldValue::Bytes(value.as_bytes().to_vec())),
        TypeName::Base64 => Ok(FieldValue::Text(STANDARD.encode(value.as_bytes()))),
        TypeName::Percentage => {
            let trimmed = value.trim();
            parse_float(value, trimmed.strip_suffix('%').unwrap_or(trimmed).trim())
        }
        TypeName::Boolean => match value.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(FieldValue::Boolean(true)),
            "false" | "0" => Ok(FieldValue::Boolean(false)),
            _ => Err(CastError::Boolean(value.to_string())),
        },
    }
}

fn parse_float(value: &str, number: &str) -> Result<FieldValue, CastError> {
    number
        .parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|source| CastError::Float {
            value: value.to_string(),
            source,
        })
}

fn parse_decimal(value: &str) -> Result<FieldValue, CastError> {
    let trimmed = value.trim();
    let decimal = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| CastError::Decimal {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    decimal
        .to_f64()
        .map(FieldValue::Float)
        .ok_or_else(|| CastError::Decimal {
            value: value.to_string(),
            reason: "out of floating point range".to_string(),
        })
}

/// Longest signed base-10 prefix, the way `parseInt(value, 10)` reads it.
fn parse_integer(value: &str) -> FieldValue {
    let s = value.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return FieldValue::NotANumber;
    }
    let literal = format!("{}{}", sign, &digits[..end]);
    match literal.parse::<i64>() {
        Ok(n) => FieldValue::Integer(n),
        Err(_) => literal
            .parse::<f64>()
            .map(FieldValue::Float)
            .unwrap_or(FieldValue::NotANumber),
    }
}

/// Cast every declared field present in `data`.
///
/// Declared fields without data are left out of the record. Failed
/// conversions become null; neither case stops the pass.
pub fn build_record(
    declare: &[(String, TypeName)],
    data: &WorkingData,
    diagnostics: &mut Vec<Diagnostic>,
) -> Record {
    let mut record = Record::new();

    for (field, type_name) in declare {
        let Some(raw) = data.get(field) else {
            warn!("No data found for key '{}'", field);
            diagnostics.push(Diagnostic::warning(format!("No data found for key '{}'", field)));
            continue;
        };
        let value = match cast(raw, type_name) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot convert value because {}", e);
                diagnostics.push(Diagnostic::warning(format!(
                    "Cannot convert '{}' to {}: {}",
                    field,
                    type_name.as_str(),
                    e
                )));
                FieldValue::Null
            }
        };
        debug!(
            "Updating records with '{}' as '{:?}' ({})",
            field,
            value,
            type_name.as_str()
        );
        record.insert(field.clone(), value);
    }

    record
}
