use crate::{SetupError, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Option-name to value map attached to an actor or condition description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get option or return error
    pub fn require(&self, name: &str) -> Result<&Value, SetupError> {
        self.0
            .get(name)
            .ok_or_else(|| SetupError::MissingOption(name.to_string()))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, SetupError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| SetupError::invalid_option(name, "expected a string"))
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.0.get(name).and_then(Value::as_str).unwrap_or(default)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, SetupError> {
        match self.0.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| SetupError::invalid_option(name, "expected a boolean")),
        }
    }

    pub fn i64_or(&self, name: &str, default: i64) -> Result<i64, SetupError> {
        match self.0.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_i64()
                .ok_or_else(|| SetupError::invalid_option(name, "expected an integer")),
        }
    }

    pub fn u64_or(&self, name: &str, default: u64) -> Result<u64, SetupError> {
        let value = self.i64_or(name, default as i64)?;
        u64::try_from(value).map_err(|_| SetupError::invalid_option(name, "must not be negative"))
    }

    /// List of strings; a single string is accepted as a one-element list
    pub fn string_list(&self, name: &str) -> Result<Vec<String>, SetupError> {
        match self.0.get(name) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Null | Value::Array(_) | Value::Object(_) => Err(
                        SetupError::invalid_option(name, "expected a list of strings"),
                    ),
                    other => Ok(other.to_string()),
                })
                .collect(),
            Some(_) => Err(SetupError::invalid_option(name, "expected a list of strings")),
        }
    }

    /// Whether the option holds a variable placeholder that is only known at run time
    pub fn is_variable(&self, name: &str) -> bool {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .map(|s| s.contains("@{"))
            .unwrap_or(false)
    }

    pub(crate) fn map_values<E>(
        &self,
        mut f: impl FnMut(&Value) -> Result<Value, E>,
    ) -> Result<Options, E> {
        let mut mapped = BTreeMap::new();
        for (name, value) in &self.0 {
            mapped.insert(name.clone(), f(value)?);
        }
        Ok(Options(mapped))
    }
}

impl FromIterator<(String, Value)> for Options {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Options(iter.into_iter().collect())
    }
}
