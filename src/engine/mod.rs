//! Dataplan evaluation
//!
//! [`evaluate`] is the pure core: definitions, then declared types, then the
//! `_datetime` stamp, all against an already parsed document. [`Driver`]
//! wraps it with document retrieval, caching and stored-record bookkeeping.

mod caster;
mod definition;
mod dispatch;
mod resolver;

pub use caster::*;
pub use definition::*;
pub use dispatch::*;
pub use resolver::*;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, Cache};
use crate::document::{DocumentQuery, HtmlDocument};
use crate::error::{FetchError, PlanError, Result};
use crate::fetch::Fetcher;
use crate::plan::{Plan, RECORDS};

/// Synthetic record field holding the evaluation time.
pub const DATETIME_FIELD: &str = "_datetime";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Warning,
    Error,
}

/// A recoverable problem noticed during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: Level::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: Level::Error, message: message.into() }
    }
}

/// Result of one evaluation pass.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub data: WorkingData,
    pub record: Record,
    pub diagnostics: Vec<Diagnostic>,
}

/// Evaluate a validated plan against a parsed document.
pub fn evaluate(plan: &Plan, document: &dyn DocumentQuery) -> Evaluation {
    evaluate_at(plan, document, Utc::now())
}

/// Same as [`evaluate`] with an explicit evaluation time.
pub fn evaluate_at(plan: &Plan, document: &dyn DocumentQuery, now: DateTime<Utc>) -> Evaluation {
    let mut data = WorkingData::new();
    let mut diagnostics = Vec::new();

    evaluate_definitions(&plan.define, document, &mut data, &mut diagnostics);
    let mut record = build_record(&plan.declare, &data, &mut diagnostics);

    debug!("Logging records datetime...");
    record.insert(DATETIME_FIELD.to_string(), FieldValue::Text(format_datetime(now)));

    Evaluation { data, record, diagnostics }
}

pub fn format_datetime(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Flags handed over by the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Always fetch live and never write the cache
    pub skip_cache: bool,
    /// Drop stored `records` before evaluating
    pub reset_records: bool,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub record: Record,
    /// The input dataplan with the new record appended to `records`
    pub dataplan: Value,
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs whole dataplans: validate, load the document, evaluate, store the record.
///
/// A driver holds no per-run state, so one instance can serve many
/// dataplans, including from several threads at once.
pub struct Driver<F, C> {
    fetcher: F,
    cache: C,
    options: RunOptions,
}

impl<F: Fetcher, C: Cache> Driver<F, C> {
    pub fn new(fetcher: F, cache: C, options: RunOptions) -> Self {
        Self { fetcher, cache, options }
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    pub fn run(&self, mut dataplan: Value) -> Result<Outcome> {
        let root = dataplan.as_object_mut().ok_or(PlanError::NotAnObject)?;
        debug!("HTML Parser initialized");

        if let Some(Value::Array(records)) = root.get(RECORDS) {
            if !records.is_empty() {
                info!("Found {} stored record(s) in dataplan", records.len());
            }
        }
        if self.options.reset_records && root.shift_remove(RECORDS).is_some() {
            info!("Cleaning stored records in dataplan...");
        }

        let plan = Plan::from_value(&dataplan)?;
        let source = self.load(&plan)?;
        let document = HtmlDocument::from_bytes(&source);
        let evaluation = evaluate(&plan, &document);
        debug!("Done");

        append_record(&mut dataplan, serde_json::to_value(&evaluation.record)?);

        Ok(Outcome {
            record: evaluation.record,
            dataplan,
            diagnostics: evaluation.diagnostics,
        })
    }

    /// Raw document bytes, from the cache when possible.
    ///
    /// Local files are always read directly and never cached.
    fn load(&self, plan: &Plan) -> Result<Vec<u8>, FetchError> {
        if plan.is_file_link() {
            debug!("Getting content from local file: {}", plan.link);
            return self.fetcher.fetch(&plan.link, &plan.headers);
        }

        let key = cache_key(&plan.link);
        if !self.options.skip_cache {
            match self.cache.read(&key) {
                Ok(content) => {
                    debug!("Getting content from cache: {}", plan.link);
                    return Ok(content);
                }
                Err(e) => debug!("Cannot get content from cache: {}", e),
            }
        }

        debug!("Getting content from URL: {}", plan.link);
        let content = self.fetcher.fetch(&plan.link, &plan.headers)?;
        if !self.options.skip_cache {
            if let Err(e) = self.cache.write(&key, &content) {
                warn!("Failed to cache source: {}", e);
            }
        }
        Ok(content)
    }
}

/// Append `record` to the dataplan's `records`, creating the array if needed.
pub fn append_record(dataplan: &mut Value, record: Value) {
    let Some(root) = dataplan.as_object_mut() else {
        return;
    };
    match root.get_mut(RECORDS) {
        Some(Value::Array(records)) => records.push(record),
        _ => {
            root.insert(RECORDS.to_string(), Value::Array(vec![record]));
        }
    }
}
