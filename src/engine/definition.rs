//! Folds `define` pipelines into field values

use tracing::{debug, error, warn};

use crate::document::DocumentQuery;
use crate::engine::dispatch::perform;
use crate::engine::resolver::{VariableResolver, WorkingData};
use crate::engine::Diagnostic;
use crate::error::StepError;
use crate::plan::{Definition, Step, ValueExpression};

/// Evaluate every definition in order and fill `data`.
///
/// Definitions for the same field act as fallbacks: the first one that
/// yields a non-empty value wins. A failing definition is logged and
/// contributes nothing.
pub fn evaluate_definitions(
    definitions: &[Definition],
    document: &dyn DocumentQuery,
    data: &mut WorkingData,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for definition in definitions {
        if definition.key_count != 1 {
            let message = format!(
                "Incorrect definition entry: expected one key, got {} (using '{}')",
                definition.key_count, definition.field
            );
            warn!("{}", message);
            diagnostics.push(Diagnostic::warning(message));
        }

        debug!("Parsing definition for '{}'", definition.field);
        match evaluate_expression(&definition.field, &definition.expr, document, data) {
            Ok(value) => {
                data.keep_first_non_empty(&definition.field, value);
            }
            Err(e) => {
                error!("Cannot parse definition '{}': {}", definition.field, e);
                diagnostics.push(Diagnostic::error(format!(
                    "Cannot parse definition '{}': {}",
                    definition.field, e
                )));
            }
        }
    }
}

/// Evaluate one expression to its raw value.
pub fn evaluate_expression(
    field: &str,
    expr: &ValueExpression,
    document: &dyn DocumentQuery,
    data: &WorkingData,
) -> Result<Option<String>, StepError> {
    let resolver = VariableResolver::new(data);
    match expr {
        ValueExpression::Literal(value) => {
            debug!("Performing {}:assignment => {}", field, value);
            Ok(Some(value.clone()))
        }
        ValueExpression::Step(step) => run_step(field, step, None, &resolver, document),
        ValueExpression::Pipeline(steps) => steps
            .iter()
            .try_fold(None, |last, step| run_step(field, step, last, &resolver, document)),
        ValueExpression::Unsupported => Ok(None),
    }
}

fn run_step(
    field: &str,
    step: &Step,
    last: Option<String>,
    resolver: &VariableResolver<'_>,
    document: &dyn DocumentQuery,
) -> Result<Option<String>, StepError> {
    let result = perform(step, last, resolver, document)?;
    debug!("Performing {}:{} => {:?}", field, step.name(), result);
    Ok(result)
}
