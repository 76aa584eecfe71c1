//! `:name` variable resolution against already-resolved fields

use std::borrow::Cow;
use std::collections::HashMap;

/// Prefix marking a token as a reference to another field.
pub const VARIABLE_PREFIX: char = ':';

/// In-progress, untyped field values of one evaluation pass.
///
/// Only non-empty values are ever stored; a missing key stands for null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingData {
    values: HashMap<String, String>,
}

impl WorkingData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Store `value` unless the field already holds something or the value is empty.
    ///
    /// Returns whether the value was kept.
    pub fn keep_first_non_empty(&mut self, field: &str, value: Option<String>) -> bool {
        let Some(value) = value else {
            return false;
        };
        if is_empty(Some(&value)) || self.values.get(field).is_some_and(|v| !is_empty(Some(v))) {
            return false;
        }
        self.values.insert(field.to_string(), value);
        true
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Null, or text that is empty once whitespace is stripped.
pub fn is_empty(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Looks up `:name` tokens in the working data.
#[derive(Debug, Clone, Copy)]
pub struct VariableResolver<'a> {
    data: &'a WorkingData,
}

impl<'a> VariableResolver<'a> {
    pub fn new(data: &'a WorkingData) -> Self {
        Self { data }
    }

    /// Resolve a token; unknown references come back untouched, prefix included.
    pub fn resolve<'t>(&self, token: &'t str) -> Cow<'t, str>
    where
        'a: 't,
    {
        match token
            .strip_prefix(VARIABLE_PREFIX)
            .and_then(|name| self.data.get(name))
        {
            Some(value) => Cow::Borrowed(value),
            None => Cow::Borrowed(token),
        }
    }
}
