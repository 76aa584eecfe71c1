//! Error types
//!
//! Plan and fetch errors abort a whole run. Cache and step errors are
//! recoverable: they get logged and the pass keeps going.

use std::io;

use thiserror::Error;

/// Structural problems found while validating a dataplan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Unexpected dataplan received: required object")]
    NotAnObject,
    #[error("Missing required section '{0}'")]
    MissingSection(&'static str),
    #[error("Wrong type: section '{section}' must be {expected}")]
    WrongSectionType {
        section: &'static str,
        expected: &'static str,
    },
    #[error("Unexpected empty link")]
    EmptyLink,
    #[error("Unsupported link protocol: {0}")]
    UnsupportedScheme(String),
}

/// Failures while retrieving the raw document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Non-2xx status code: {0}")]
    Status(u16),
    #[error("Cannot find content type for document")]
    MissingContentType,
    #[error("Unsupported content, got {0}")]
    UnsupportedContent(String),
    #[error("Cannot get content from file '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("request to {link} failed: {reason}")]
    Transport { link: String, reason: String },
}

/// Cache lookups that did not produce usable content.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("No cache to read")]
    Miss,
    #[error("Cache has expired")]
    Expired,
    #[error("Empty file")]
    Empty,
    #[error("Missing cache path")]
    MissingKey,
    #[error("Missing cache data")]
    MissingData,
    #[error("Cannot create cache directory because a file with the same name already exists")]
    NotADirectory,
    #[error("Cache lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Selector or XPath failures; queries that fail behave like a miss.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid CSS selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
    #[error("cannot evaluate XPath '{expr}': {reason}")]
    XPath { expr: String, reason: String },
}

/// A single pipeline step that could not run; the definition entry yields no value.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("invalid regular expression '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: fancy_regex::Error,
    },
    #[error("invalid '{op}' operation: {reason}")]
    InvalidOperation { op: &'static str, reason: String },
}

/// A declared type that could not be applied; the field becomes null.
#[derive(Debug, Error)]
pub enum CastError {
    #[error("'{value}' is not a decimal: {reason}")]
    Decimal { value: String, reason: String },
    #[error("'{value}' is not a number: {source}")]
    Float {
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("Non-boolean value: '{0}'")]
    Boolean(String),
}

/// Top-level error for a whole run.
#[derive(Debug, Error)]
pub enum HapError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No link provided. See --help")]
    NoLink,
}

pub type Result<T, E = HapError> = std::result::Result<T, E>;
