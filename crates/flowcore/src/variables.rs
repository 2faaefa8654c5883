//! Scope-chained string variables and `@{name}` placeholder expansion.
//!
//! Every scope-bearing actor in a flow owns one frame in a [`VariableScopes`]
//! arena. Frames only point at their parent, so lookups are a plain walk up
//! the parent chain: the innermost definition wins. An isolated frame ends
//! the walk, which is how local scopes hide the outer variables.

use crate::{ExecutionError, Options, Value};
use std::collections::{BTreeMap, HashMap};

const PLACEHOLDER_START: &str = "@{";
const PLACEHOLDER_END: char = '}';

/// Handle of one frame in a [`VariableScopes`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
struct Frame {
    parent: Option<ScopeId>,
    isolated: bool,
    vars: HashMap<String, String>,
}

/// Arena of variable frames belonging to one flow instance
#[derive(Debug)]
pub struct VariableScopes {
    frames: Vec<Frame>,
}

impl VariableScopes {
    /// Creates an arena holding only the root frame
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Adds a frame whose lookups fall back to `parent`
    pub fn add_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.frames.push(Frame {
            parent: Some(parent),
            ..Frame::default()
        });
        ScopeId(self.frames.len() - 1)
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.frames[scope.0].parent
    }

    /// Looks `name` up from `scope` outwards
    pub fn get(&self, scope: ScopeId, name: &str) -> Option<&str> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = &self.frames[id.0];
            if let Some(value) = frame.vars.get(name) {
                return Some(value);
            }
            if frame.isolated {
                return None;
            }
            current = frame.parent;
        }
        None
    }

    pub fn contains(&self, scope: ScopeId, name: &str) -> bool {
        self.get(scope, name).is_some()
    }

    /// Binds `name` in exactly this frame
    pub fn set(&mut self, scope: ScopeId, name: impl Into<String>, value: impl Into<String>) {
        self.frames[scope.0].vars.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, scope: ScopeId, name: &str) -> Option<String> {
        self.frames[scope.0].vars.remove(name)
    }

    /// Drops all bindings of the frame and reconnects it to its parent
    pub fn clear(&mut self, scope: ScopeId) {
        let frame = &mut self.frames[scope.0];
        frame.vars.clear();
        frame.isolated = false;
    }

    pub fn set_isolated(&mut self, scope: ScopeId, isolated: bool) {
        self.frames[scope.0].isolated = isolated;
    }

    /// Bindings defined directly in this frame
    pub fn local(&self, scope: ScopeId) -> BTreeMap<String, String> {
        self.frames[scope.0]
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Every binding visible from `scope`, innermost first-match applied
    pub fn visible(&self, scope: ScopeId) -> BTreeMap<String, String> {
        let mut chain = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let frame = &self.frames[id.0];
            chain.push(frame);
            if frame.isolated {
                break;
            }
            current = frame.parent;
        }

        let mut visible = BTreeMap::new();
        for frame in chain.into_iter().rev() {
            for (name, value) in &frame.vars {
                visible.insert(name.clone(), value.clone());
            }
        }
        visible
    }

    /// Expands all placeholders in `template` against the chain at `scope`
    pub fn expand(&self, scope: ScopeId, template: &str) -> Result<String, ExecutionError> {
        expand_with(template, |name| self.get(scope, name))
    }

    /// Expands strings anywhere inside `value`, including nested arrays and objects
    pub fn expand_value(&self, scope: ScopeId, value: &Value) -> Result<Value, ExecutionError> {
        match value {
            Value::String(s) if s.contains(PLACEHOLDER_START) => {
                Ok(Value::String(self.expand(scope, s)?))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.expand_value(scope, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut expanded = BTreeMap::new();
                for (key, item) in map {
                    expanded.insert(key.clone(), self.expand_value(scope, item)?);
                }
                Ok(Value::Object(expanded))
            }
            other => Ok(other.clone()),
        }
    }

    pub fn expand_options(
        &self,
        scope: ScopeId,
        options: &Options,
    ) -> Result<Options, ExecutionError> {
        options.map_values(|value| self.expand_value(scope, value))
    }
}

impl Default for VariableScopes {
    fn default() -> Self {
        Self::new()
    }
}

/// Single left-to-right substitution pass over `template`.
///
/// Substituted values are copied verbatim and never scanned again. An
/// unterminated `@{` or an empty `@{}` is kept as literal text.
pub fn expand_with<'a>(
    template: &str,
    lookup: impl Fn(&str) -> Option<&'a str>,
) -> Result<String, ExecutionError> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(PLACEHOLDER_START) {
        result.push_str(&rest[..start]);
        let after = &rest[start + PLACEHOLDER_START.len()..];

        match after.find(PLACEHOLDER_END) {
            Some(0) => {
                result.push_str(PLACEHOLDER_START);
                result.push(PLACEHOLDER_END);
                rest = &after[1..];
            }
            Some(end) => {
                let name = &after[..end];
                let value = lookup(name).ok_or_else(|| ExecutionError::MissingVariable {
                    name: name.to_string(),
                })?;
                result.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    Ok(result)
}

/// Names of all placeholders referenced in `template`, in order of appearance
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(PLACEHOLDER_START) {
        let after = &rest[start + PLACEHOLDER_START.len()..];
        match after.find(PLACEHOLDER_END) {
            Some(end) => {
                if end > 0 {
                    names.push(&after[..end]);
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_is_not_recursive() {
        let mut vars = VariableScopes::new();
        let root = vars.root();
        vars.set(root, "x", "@{y}");
        vars.set(root, "y", "nope");

        assert_eq!(vars.expand(root, "value=@{x}").unwrap(), "value=@{y}");
    }

    #[test]
    fn plain_substitution() {
        let mut vars = VariableScopes::new();
        let root = vars.root();
        vars.set(root, "x", "5");
        assert_eq!(vars.expand(root, "@{x}").unwrap(), "5");
        assert_eq!(vars.expand(root, "a@{x}b@{x}c").unwrap(), "a5b5c");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let vars = VariableScopes::new();
        let err = vars.expand(vars.root(), "@{nope}").unwrap_err();
        assert_eq!(
            err,
            ExecutionError::MissingVariable {
                name: "nope".to_string()
            }
        );
    }

    #[test]
    fn malformed_placeholders_stay_literal() {
        let vars = VariableScopes::new();
        assert_eq!(vars.expand(vars.root(), "a@{}b").unwrap(), "a@{}b");
        assert_eq!(vars.expand(vars.root(), "tail @{open").unwrap(), "tail @{open");
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut vars = VariableScopes::new();
        let root = vars.root();
        let inner = vars.add_scope(root);
        vars.set(root, "x", "outer");
        vars.set(root, "y", "only-outer");
        vars.set(inner, "x", "inner");

        assert_eq!(vars.get(inner, "x"), Some("inner"));
        assert_eq!(vars.get(inner, "y"), Some("only-outer"));
        assert_eq!(vars.get(root, "x"), Some("outer"));
    }

    #[test]
    fn isolated_scope_hides_outer_bindings() {
        let mut vars = VariableScopes::new();
        let root = vars.root();
        let inner = vars.add_scope(root);
        vars.set(root, "x", "outer");
        vars.set_isolated(inner, true);
        assert_eq!(vars.get(inner, "x"), None);

        vars.clear(inner);
        assert_eq!(vars.get(inner, "x"), Some("outer"));
    }

    #[test]
    fn visible_applies_innermost_first() {
        let mut vars = VariableScopes::new();
        let root = vars.root();
        let inner = vars.add_scope(root);
        vars.set(root, "a", "1");
        vars.set(root, "b", "2");
        vars.set(inner, "b", "3");

        let visible = vars.visible(inner);
        assert_eq!(visible.get("a").map(String::as_str), Some("1"));
        assert_eq!(visible.get("b").map(String::as_str), Some("3"));
    }

    #[test]
    fn expands_nested_option_values() {
        let mut vars = VariableScopes::new();
        let root = vars.root();
        vars.set(root, "n", "a");
        let options = Options::new()
            .with("names", vec!["@{n}", "b"])
            .with("count", 3);

        let expanded = vars.expand_options(root, &options).unwrap();
        assert_eq!(expanded.get("names"), Some(&Value::from(vec!["a", "b"])));
        assert_eq!(expanded.get("count"), Some(&Value::Integer(3)));
    }

    #[test]
    fn lists_placeholders() {
        assert_eq!(placeholders("@{a}-@{b}-@{}"), vec!["a", "b"]);
    }
}
