//! Boolean conditions for `control.if_then_else`, `control.switch` and
//! `control.count`.
//!
//! Conditions keep their raw options and expand variables themselves on
//! every evaluation.

use flowcore::{
    Condition, ConditionContext, ExecutionError, Options, SetupError, StorageName, Token, Value,
};
use flowruntime::{ActorRegistry, ConditionFactory};
use regex::Regex;
use std::sync::Arc;

pub(crate) fn register_all(registry: &mut ActorRegistry) {
    registry.register_condition(Arc::new(ConstantFactory(true)));
    registry.register_condition(Arc::new(ConstantFactory(false)));
    registry.register_condition(Arc::new(VariableEqualsFactory));
    registry.register_condition(Arc::new(HasStorageFactory));
    registry.register_condition(Arc::new(PayloadMatchesFactory));
    registry.register_condition(Arc::new(NumericFactory));
    registry.register_condition(Arc::new(CountingFactory));
}

fn expand_str(
    ctx: &ConditionContext<'_>,
    options: &Options,
    name: &str,
) -> Result<String, ExecutionError> {
    match options.require(name)? {
        Value::String(template) => ctx.expand(template),
        other => Ok(other.to_string()),
    }
}

/// Always `true` or always `false`
pub struct Constant(bool);

impl Condition for Constant {
    fn condition_type(&self) -> &str {
        if self.0 {
            "true"
        } else {
            "false"
        }
    }

    fn evaluate(
        &mut self,
        _ctx: &ConditionContext<'_>,
        _token: Option<&Token>,
    ) -> Result<bool, ExecutionError> {
        Ok(self.0)
    }
}

struct ConstantFactory(bool);

impl ConditionFactory for ConstantFactory {
    fn create(&self, _options: &Options) -> Result<Box<dyn Condition>, SetupError> {
        Ok(Box::new(Constant(self.0)))
    }

    fn condition_type(&self) -> &str {
        if self.0 {
            "true"
        } else {
            "false"
        }
    }

    fn description(&self) -> &str {
        "Constant outcome"
    }
}

/// True when a variable is defined and equals `value`
pub struct VariableEquals {
    options: Options,
}

impl Condition for VariableEquals {
    fn condition_type(&self) -> &str {
        "variable_equals"
    }

    fn evaluate(
        &mut self,
        ctx: &ConditionContext<'_>,
        _token: Option<&Token>,
    ) -> Result<bool, ExecutionError> {
        let name = expand_str(ctx, &self.options, "variable_name")?;
        let expected = expand_str(ctx, &self.options, "value")?;
        Ok(ctx.variable(&name) == Some(expected.as_str()))
    }
}

struct VariableEqualsFactory;

impl ConditionFactory for VariableEqualsFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Condition>, SetupError> {
        options.require_str("variable_name")?;
        options.require("value")?;
        Ok(Box::new(VariableEquals {
            options: options.clone(),
        }))
    }

    fn condition_type(&self) -> &str {
        "variable_equals"
    }

    fn description(&self) -> &str {
        "Compares a variable with a value"
    }
}

/// True when the named storage slot holds a value
pub struct HasStorage {
    options: Options,
}

impl Condition for HasStorage {
    fn condition_type(&self) -> &str {
        "has_storage"
    }

    fn evaluate(
        &mut self,
        ctx: &ConditionContext<'_>,
        _token: Option<&Token>,
    ) -> Result<bool, ExecutionError> {
        let name = StorageName::parse(&expand_str(ctx, &self.options, "storage_name")?)?;
        Ok(ctx.has_storage(&name))
    }
}

struct HasStorageFactory;

impl ConditionFactory for HasStorageFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Condition>, SetupError> {
        options.require_str("storage_name")?;
        Ok(Box::new(HasStorage {
            options: options.clone(),
        }))
    }

    fn condition_type(&self) -> &str {
        "has_storage"
    }

    fn description(&self) -> &str {
        "Checks whether a storage slot is set"
    }
}

/// True when the token payload, rendered as text, matches `pattern`.
/// Without a token it is false.
pub struct PayloadMatches {
    pattern: Regex,
}

impl Condition for PayloadMatches {
    fn condition_type(&self) -> &str {
        "payload_matches"
    }

    fn evaluate(
        &mut self,
        _ctx: &ConditionContext<'_>,
        token: Option<&Token>,
    ) -> Result<bool, ExecutionError> {
        Ok(token.map_or(false, |token| {
            self.pattern.is_match(&token.payload().to_string())
        }))
    }
}

struct PayloadMatchesFactory;

impl ConditionFactory for PayloadMatchesFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Condition>, SetupError> {
        let pattern = options.require_str("pattern")?;
        let pattern =
            Regex::new(pattern).map_err(|e| SetupError::invalid_option("pattern", e.to_string()))?;
        Ok(Box::new(PayloadMatches { pattern }))
    }

    fn condition_type(&self) -> &str {
        "payload_matches"
    }

    fn description(&self) -> &str {
        "Matches the token payload against a regular expression"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Operator {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "lt" | "<" => Some(Operator::Lt),
            "le" | "<=" => Some(Operator::Le),
            "eq" | "==" => Some(Operator::Eq),
            "ne" | "!=" => Some(Operator::Ne),
            "ge" | ">=" => Some(Operator::Ge),
            "gt" | ">" => Some(Operator::Gt),
            _ => None,
        }
    }

    fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Operator::Lt => left < right,
            Operator::Le => left <= right,
            Operator::Eq => left == right,
            Operator::Ne => left != right,
            Operator::Ge => left >= right,
            Operator::Gt => left > right,
        }
    }
}

/// Compares a numeric token payload: `payload <operator> value`
pub struct Numeric {
    operator: Operator,
    options: Options,
}

impl Condition for Numeric {
    fn condition_type(&self) -> &str {
        "numeric"
    }

    fn evaluate(
        &mut self,
        ctx: &ConditionContext<'_>,
        token: Option<&Token>,
    ) -> Result<bool, ExecutionError> {
        let payload = token
            .ok_or_else(|| ExecutionError::invalid_input("numeric token", "nothing"))?
            .payload();
        let left = payload
            .as_f64()
            .ok_or_else(|| ExecutionError::invalid_input("number", payload.type_name()))?;

        let raw = expand_str(ctx, &self.options, "value")?;
        let right = Value::String(raw.clone()).as_f64().ok_or_else(|| {
            ExecutionError::Failed(format!("condition value '{}' is not a number", raw))
        })?;
        Ok(self.operator.apply(left, right))
    }
}

struct NumericFactory;

impl ConditionFactory for NumericFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Condition>, SetupError> {
        let raw = options.str_or("operator", "eq");
        let operator = Operator::parse(raw).ok_or_else(|| {
            SetupError::invalid_option("operator", format!("unknown operator '{}'", raw))
        })?;
        options.require("value")?;
        Ok(Box::new(Numeric {
            operator,
            options: options.clone(),
        }))
    }

    fn condition_type(&self) -> &str {
        "numeric"
    }

    fn description(&self) -> &str {
        "Compares a numeric payload (lt, le, eq, ne, ge, gt)"
    }
}

/// Counts evaluations since the last reset; true for the `min`th call and
/// every `interval`th call after it, up to `max`
pub struct Counting {
    min: u64,
    max: Option<u64>,
    interval: u64,
    count: u64,
}

impl Counting {
    pub fn new(min: u64, max: Option<u64>, interval: u64) -> Self {
        Self {
            min,
            max,
            interval: interval.max(1),
            count: 0,
        }
    }
}

impl Condition for Counting {
    fn condition_type(&self) -> &str {
        "counting"
    }

    fn evaluate(
        &mut self,
        _ctx: &ConditionContext<'_>,
        _token: Option<&Token>,
    ) -> Result<bool, ExecutionError> {
        self.count += 1;
        let within = self.count >= self.min && self.max.map_or(true, |max| self.count <= max);
        Ok(within && (self.count - self.min) % self.interval == 0)
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

struct CountingFactory;

impl ConditionFactory for CountingFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Condition>, SetupError> {
        let max = match options.get("max") {
            None => None,
            Some(_) => Some(options.u64_or("max", 0)?),
        };
        let interval = options.u64_or("interval", 1)?;
        if interval == 0 {
            return Err(SetupError::invalid_option("interval", "must be at least 1"));
        }
        Ok(Box::new(Counting::new(
            options.u64_or("min", 1)?,
            max,
            interval,
        )))
    }

    fn condition_type(&self) -> &str {
        "counting"
    }

    fn description(&self) -> &str {
        "Counts tokens: min (default 1), max, interval (default 1)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::{StorageTable, VariableScopes};

    fn outcomes(condition: &mut dyn Condition, calls: usize) -> Vec<bool> {
        let variables = VariableScopes::new();
        let storage = StorageTable::new();
        let ctx = ConditionContext::new(variables.root(), &variables, &storage);
        (0..calls)
            .map(|_| condition.evaluate(&ctx, None).unwrap())
            .collect()
    }

    #[test]
    fn counting_honours_min_max_and_interval() {
        let mut counting = Counting::new(2, Some(6), 2);
        assert_eq!(
            outcomes(&mut counting, 8),
            vec![false, true, false, true, false, true, false, false]
        );
    }

    #[test]
    fn counting_restarts_after_reset() {
        let mut counting = Counting::new(1, Some(1), 1);
        assert_eq!(outcomes(&mut counting, 2), vec![true, false]);
        counting.reset();
        assert_eq!(outcomes(&mut counting, 1), vec![true]);
    }

    #[test]
    fn operators_parse_both_spellings() {
        assert_eq!(Operator::parse(">="), Some(Operator::Ge));
        assert_eq!(Operator::parse("ge"), Some(Operator::Ge));
        assert_eq!(Operator::parse("~"), None);
    }
}
