//! Dataplan model and section validation
//!
//! A dataplan is a JSON object with the sections `meta?`, `config?`, `link`,
//! `define`, `declare` and `records?`. [`Plan::from_value`] walks the
//! sections in that fixed order and turns the loose JSON into typed
//! definitions, resolving operation precedence once up front.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::PlanError;

pub const META: &str = "meta";
pub const CONFIG: &str = "config";
pub const HEADERS: &str = "headers";
pub const LINK: &str = "link";
pub const DEFINE: &str = "define";
pub const DECLARE: &str = "declare";
pub const RECORDS: &str = "records";

pub const FILE_PROTOCOL: &str = "file://";
pub const HTTP_PROTOCOL: &str = "http://";
pub const HTTPS_PROTOCOL: &str = "https://";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Object,
    Array,
    String,
}

impl Shape {
    fn matches(self, value: &Value) -> bool {
        match self {
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
            Shape::String => value.is_string(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Shape::Object => "an object",
            Shape::Array => "an array",
            Shape::String => "a string",
        }
    }
}

struct SectionRule {
    name: &'static str,
    required: bool,
    shape: Shape,
}

/// Sections in evaluation order.
const SECTIONS: [SectionRule; 5] = [
    SectionRule { name: META, required: false, shape: Shape::Object },
    SectionRule { name: CONFIG, required: false, shape: Shape::Object },
    SectionRule { name: LINK, required: true, shape: Shape::String },
    SectionRule { name: DEFINE, required: true, shape: Shape::Array },
    SectionRule { name: DECLARE, required: true, shape: Shape::Object },
];

/// A validated dataplan, ready for evaluation.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub meta: Map<String, Value>,
    /// Outgoing HTTP headers from `config.headers`
    pub headers: BTreeMap<String, String>,
    pub link: String,
    /// `define` entries in priority order
    pub define: Vec<Definition>,
    /// Declared output fields, in document order
    pub declare: Vec<(String, TypeName)>,
}

/// One `define` entry: a field and the expression that produces its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub field: String,
    pub expr: ValueExpression,
    /// Number of keys the raw entry carried; anything but 1 is suspicious
    pub key_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpression {
    /// Plain assignment, no pipeline
    Literal(String),
    Step(Step),
    Pipeline(Vec<Step>),
    /// Anything else; always evaluates to null
    Unsupported,
}

/// A single extraction or transform operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    QueryCss(String),
    QueryXPath(String),
    Pattern(String),
    Replace { old: String, new: String },
    Remove(String),
    Glue(Glue),
    /// A recognized operation with an unusable payload
    Invalid { op: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Glue {
    /// Space separated sentence, rejoined with a single space
    Words(String),
    /// Items joined with no separator
    Items(Vec<String>),
    Unsupported,
}

impl Step {
    /// Operation name as it shows up in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Step::QueryCss(_) => "query:css",
            Step::QueryXPath(_) => "query:xpath",
            Step::Pattern(_) => "pattern",
            Step::Replace { .. } => "replace",
            Step::Remove(_) => "remove",
            Step::Glue(_) => "glue",
            Step::Invalid { op, .. } => op,
        }
    }

    /// Build a step from a `define` object.
    ///
    /// Several keys may be present at once; the first one in
    /// css > xpath > pattern > replace > remove > glue order wins.
    /// Returns `None` when the object names no operation at all.
    pub fn from_object(obj: &Map<String, Value>) -> Option<Step> {
        if let Some(css) = non_null(obj, "query")
            .or_else(|| non_null(obj, "query_css"))
            .or_else(|| non_null(obj, "follow"))
        {
            return Some(string_payload("query:css", css).map_or_else(|s| s, Step::QueryCss));
        }
        if let Some(xpath) = non_null(obj, "query_xpath").or_else(|| non_null(obj, "follow_xpath")) {
            return Some(string_payload("query:xpath", xpath).map_or_else(|s| s, Step::QueryXPath));
        }
        if let Some(pattern) = non_null(obj, "pattern") {
            return Some(string_payload("pattern", pattern).map_or_else(|s| s, Step::Pattern));
        }
        if let Some(replace) = non_null(obj, "replace") {
            return Some(parse_replace(replace));
        }
        if let Some(remove) = non_null(obj, "remove") {
            return Some(string_payload("remove", remove).map_or_else(|s| s, Step::Remove));
        }
        if let Some(glue) = non_null(obj, "glue") {
            return Some(parse_glue(glue));
        }
        None
    }
}

impl ValueExpression {
    pub fn from_value(value: &Value) -> ValueExpression {
        match value {
            Value::String(s) => ValueExpression::Literal(s.clone()),
            Value::Object(obj) => match Step::from_object(obj) {
                Some(step) => ValueExpression::Step(step),
                None => ValueExpression::Unsupported,
            },
            // Non-object entries and objects without an operation are skipped
            Value::Array(items) => ValueExpression::Pipeline(
                items
                    .iter()
                    .filter_map(|item| item.as_object().and_then(Step::from_object))
                    .collect(),
            ),
            _ => ValueExpression::Unsupported,
        }
    }
}

/// Declared output type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    Decimal,
    String,
    Text,
    Integer,
    Number,
    Float,
    Double,
    Ascii,
    Base64,
    Bytes,
    Percentage,
    Boolean,
    /// Unknown names pass values through unconverted
    Other(String),
}

impl TypeName {
    pub fn parse(name: &str) -> TypeName {
        match name {
            "decimal" => TypeName::Decimal,
            "string" => TypeName::String,
            "text" => TypeName::Text,
            "integer" => TypeName::Integer,
            "number" => TypeName::Number,
            "float" => TypeName::Float,
            "double" => TypeName::Double,
            "ascii" => TypeName::Ascii,
            "base64" => TypeName::Base64,
            "bytes" => TypeName::Bytes,
            "percentage" => TypeName::Percentage,
            "boolean" => TypeName::Boolean,
            other => TypeName::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TypeName::Decimal => "decimal",
            TypeName::String => "string",
            TypeName::Text => "text",
            TypeName::Integer => "integer",
            TypeName::Number => "number",
            TypeName::Float => "float",
            TypeName::Double => "double",
            TypeName::Ascii => "ascii",
            TypeName::Base64 => "base64",
            TypeName::Bytes => "bytes",
            TypeName::Percentage => "percentage",
            TypeName::Boolean => "boolean",
            TypeName::Other(name) => name,
        }
    }
}

impl Plan {
    /// Validate a raw dataplan section by section.
    ///
    /// Optional sections may be absent; required ones may not. A present
    /// section with the wrong JSON shape is fatal, as is an empty link or a
    /// link with an unsupported scheme.
    pub fn from_value(dataplan: &Value) -> Result<Plan, PlanError> {
        let root = dataplan.as_object().ok_or(PlanError::NotAnObject)?;
        let mut plan = Plan::default();

        for rule in &SECTIONS {
            let data = match root.get(rule.name) {
                Some(data) => data,
                None if rule.required => return Err(PlanError::MissingSection(rule.name)),
                None => continue,
            };
            if !rule.shape.matches(data) {
                return Err(PlanError::WrongSectionType {
                    section: rule.name,
                    expected: rule.shape.describe(),
                });
            }
            match (rule.name, data) {
                (META, Value::Object(meta)) => plan.prepare_meta(meta),
                (CONFIG, Value::Object(config)) => plan.prepare_config(config),
                (LINK, Value::String(link)) => plan.prepare_link(link)?,
                (DEFINE, Value::Array(entries)) => plan.prepare_define(entries),
                (DECLARE, Value::Object(declarations)) => plan.prepare_declare(declarations),
                _ => unreachable!("section shape checked above"),
            }
        }

        Ok(plan)
    }

    fn prepare_meta(&mut self, meta: &Map<String, Value>) {
        if !meta.is_empty() {
            debug!("Listing meta fields");
            for (key, value) in meta {
                debug!(" {} = {}", key, value);
            }
        }
        self.meta = meta.clone();
    }

    fn prepare_config(&mut self, config: &Map<String, Value>) {
        let Some(Value::Object(headers)) = config.get(HEADERS) else {
            return;
        };
        for (name, value) in headers {
            let Value::String(value) = value else {
                warn!("Ignoring non-string value for header '{}': {}", name, value);
                continue;
            };
            self.headers.insert(name.clone(), value.clone());
        }
    }

    fn prepare_link(&mut self, link: &str) -> Result<(), PlanError> {
        if link.is_empty() {
            return Err(PlanError::EmptyLink);
        }
        if !is_supported_link(link) {
            return Err(PlanError::UnsupportedScheme(link.to_string()));
        }
        self.link = link.to_string();
        Ok(())
    }

    fn prepare_define(&mut self, entries: &[Value]) {
        for entry in entries {
            let obj = match entry.as_object() {
                Some(obj) if !obj.is_empty() => obj,
                _ => {
                    warn!("Skipping definition entry without a field: {}", entry);
                    continue;
                }
            };
            // The last enumerated key wins when an entry carries several
            let Some((field, value)) = obj.iter().last() else {
                continue;
            };
            self.define.push(Definition {
                field: field.clone(),
                expr: ValueExpression::from_value(value),
                key_count: obj.len(),
            });
        }
    }

    fn prepare_declare(&mut self, declarations: &Map<String, Value>) {
        self.declare = declarations
            .iter()
            .map(|(field, type_name)| {
                let type_name = match type_name {
                    Value::String(s) => TypeName::parse(s),
                    other => TypeName::Other(other.to_string()),
                };
                (field.clone(), type_name)
            })
            .collect();
    }

    pub fn is_file_link(&self) -> bool {
        self.link.starts_with(FILE_PROTOCOL)
    }
}

pub fn is_supported_link(link: &str) -> bool {
    [FILE_PROTOCOL, HTTP_PROTOCOL, HTTPS_PROTOCOL]
        .iter()
        .any(|scheme| link.starts_with(scheme))
}

fn non_null<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn string_payload(op: &'static str, value: &Value) -> Result<String, Step> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(Step::Invalid {
            op,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

fn parse_replace(value: &Value) -> Step {
    match value.as_array().map(Vec::as_slice) {
        Some([Value::String(old), Value::String(new)]) => Step::Replace {
            old: old.clone(),
            new: new.clone(),
        },
        _ => Step::Invalid {
            op: "replace",
            reason: format!("expected [old, new] strings, got {}", value),
        },
    }
}

fn parse_glue(value: &Value) -> Step {
    match value {
        Value::String(s) => Step::Glue(Glue::Words(s.clone())),
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => parts.push(s.clone()),
                    Value::Number(n) => parts.push(n.to_string()),
                    Value::Bool(b) => parts.push(b.to_string()),
                    other => {
                        return Step::Invalid {
                            op: "glue",
                            reason: format!("cannot glue {}", other),
                        }
                    }
                }
            }
            Step::Glue(Glue::Items(parts))
        }
        _ => Step::Glue(Glue::Unsupported),
    }
}
