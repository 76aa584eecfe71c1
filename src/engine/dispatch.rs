//! Executes one pipeline step against the running result

use fancy_regex::Regex;
use tracing::debug;

use crate::document::DocumentQuery;
use crate::engine::resolver::VariableResolver;
use crate::error::{QueryError, StepError};
use crate::plan::{Glue, Step};

/// Run `step` with `last` as input and return the new running result.
///
/// Queries read the document and ignore `last` unless they miss. The string
/// operations only touch `last`; when it is null they hand it back as is.
pub fn perform(
    step: &Step,
    last: Option<String>,
    resolver: &VariableResolver<'_>,
    document: &dyn DocumentQuery,
) -> Result<Option<String>, StepError> {
    match step {
        Step::QueryCss(selector) => Ok(query(document.query_css(selector), last)),
        Step::QueryXPath(expr) => Ok(query(document.query_xpath(expr), last)),
        Step::Pattern(pattern) => perform_pattern(pattern, last, resolver),
        Step::Replace { old, new } => Ok(last.map(|text| {
            let old = resolver.resolve(old);
            let new = resolver.resolve(new);
            text.replacen(&*old, &new, 1)
        })),
        Step::Remove(remove) => match last {
            Some(text) => {
                let pattern = resolver.resolve(remove);
                let re = compile(&pattern)?;
                remove_all(&re, &pattern, &text).map(Some)
            }
            None => Ok(None),
        },
        Step::Glue(glue) => Ok(perform_glue(glue, last, resolver)),
        Step::Invalid { op, reason } => Err(StepError::InvalidOperation {
            op,
            reason: reason.clone(),
        }),
    }
}

fn query(result: Result<Option<String>, QueryError>, last: Option<String>) -> Option<String> {
    match result {
        Ok(Some(text)) => Some(text.trim().to_string()),
        Ok(None) => last,
        Err(e) => {
            debug!("Query failed, keeping previous result: {}", e);
            last
        }
    }
}

/// Extract the first capture group.
///
/// No match, or a pattern without groups, keeps `last`. A match where
/// group 1 did not take part yields null, so a later fallback for the
/// field can still run.
fn perform_pattern(
    pattern: &str,
    last: Option<String>,
    resolver: &VariableResolver<'_>,
) -> Result<Option<String>, StepError> {
    let Some(text) = last else {
        return Ok(None);
    };
    let pattern = pattern
        .split(' ')
        .map(|word| resolver.resolve(word))
        .collect::<Vec<_>>()
        .join(" ");
    let re = compile(&pattern)?;
    let group = match re
        .captures(&text)
        .map_err(|source| regex_error(&pattern, source))?
    {
        Some(caps) if caps.len() > 1 => Some(caps.get(1).map(|m| m.as_str().to_string())),
        _ => None,
    };
    Ok(group.unwrap_or(Some(text)))
}

/// Strip every match of `re` from `text`.
fn remove_all(re: &Regex, pattern: &str, text: &str) -> Result<String, StepError> {
    let mut out = String::with_capacity(text.len());
    let mut end = 0;
    for found in re.find_iter(text) {
        let found = found.map_err(|source| regex_error(pattern, source))?;
        out.push_str(&text[end..found.start()]);
        end = found.end();
    }
    out.push_str(&text[end..]);
    Ok(out)
}

fn perform_glue(glue: &Glue, last: Option<String>, resolver: &VariableResolver<'_>) -> Option<String> {
    match glue {
        Glue::Words(sentence) => Some(
            sentence
                .split_whitespace()
                .map(|word| resolver.resolve(word))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Glue::Items(items) => Some(items.iter().map(|item| resolver.resolve(item)).collect()),
        Glue::Unsupported => last,
    }
}

fn compile(pattern: &str) -> Result<Regex, StepError> {
    Regex::new(pattern).map_err(|source| regex_error(pattern, source))
}

fn regex_error(pattern: &str, source: fancy_regex::Error) -> StepError {
    StepError::Regex {
        pattern: pattern.to_string(),
        source,
    }
}
