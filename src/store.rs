//! Reading and writing dataplan files

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};

use crate::error::{HapError, PlanError, Result};
use crate::plan::LINK;

/// Printed by `--sample`.
pub const SAMPLE_PLAN: &str = r#"{
    "meta": {
        "name": "Hap sample",
        "description": "Collects the repository title and link of a GitHub project"
    },
    "config": {
        "headers": {
            "Accept-Language": "en-US"
        }
    },
    "link": "https://github.com/lexndru/hap",
    "define": [
        {"title": {"query": "title"}},
        {"title": "Hap GitHub"},
        {"repository": {"query_xpath": "//meta[@property='og:url']/@content"}},
        {"owner": [
            {"query_css": "title"},
            {"pattern": "(\\w+)/hap"}
        ]}
    ],
    "declare": {
        "title": "string",
        "repository": "string",
        "owner": "string"
    }
}"#;

pub fn parse_plan(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(PlanError::NotAnObject.into());
    }
    Ok(value)
}

pub fn read_plan(path: impl AsRef<Path>) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    parse_plan(&text)
}

pub fn write_plan(path: impl AsRef<Path>, dataplan: &Value) -> Result<()> {
    let mut json = to_pretty_json(dataplan)?;
    json.push('\n');
    fs::write(path, json)?;
    Ok(())
}

/// Pretty JSON with a four space indent.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| HapError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Apply a `--link` override, then make sure a usable link is present.
pub fn override_link(dataplan: &mut Value, link: Option<&str>) -> Result<()> {
    let root = dataplan.as_object_mut().ok_or(PlanError::NotAnObject)?;
    if let Some(link) = link {
        root.insert(LINK.to_string(), Value::String(link.to_string()));
    }
    match root.get(LINK) {
        None | Some(Value::Null) => Err(HapError::NoLink),
        Some(Value::String(s)) if s.is_empty() => Err(HapError::NoLink),
        Some(_) => Ok(()),
    }
}

/// File name for saving a plan that came from stdin.
pub fn stdin_plan_filename(now: DateTime<Utc>) -> String {
    format!("dataplan-{}.json", now.format("%Y%m%d%H%M%S"))
}
