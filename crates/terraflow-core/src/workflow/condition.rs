//! Decision condition evaluation.
//!
//! Decision nodes select a branch by evaluating their config against the
//! execution context. Four modes are supported: `comparison` (field vs.
//! literal under an operator), `threshold` (numeric bound check),
//! `data-check` (existence / non-emptiness / success of a field), and
//! `expression` (JEXL over a structured context object).
//!
//! **Security note:** Node outputs are always passed to the expression
//! evaluator as context objects, NEVER interpolated into expression strings.

use serde_json::{json, Value};
use terraflow_types::workflow::WorkflowNode;

use super::context::ExecutionContext;

/// Two numbers within this distance compare as equal.
pub const NUMERIC_EPSILON: f64 = 1e-4;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("decision node '{node}' is missing config key '{key}'")]
    MissingConfig { node: String, key: String },

    #[error("unknown condition type '{0}'")]
    UnknownConditionType(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown data check '{0}'")]
    UnknownCheck(String),

    #[error("expression evaluation failed: {0}")]
    Expression(String),
}

// ---------------------------------------------------------------------------
// ConditionEvaluator
// ---------------------------------------------------------------------------

/// Evaluates decision node conditions. One instance is shared per engine.
pub struct ConditionEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    /// Create an evaluator with the standard transforms registered.
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("length", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                let len = match &val {
                    Value::String(s) => s.len(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("abs", |args: &[Value]| {
                let n = args.first().and_then(|v| v.as_f64()).unwrap_or(0.0);
                Ok(json!(n.abs()))
            });
        Self { evaluator }
    }

    /// Evaluate a decision node's condition to a branch outcome.
    pub fn evaluate(
        &self,
        node: &WorkflowNode,
        ctx: &ExecutionContext,
    ) -> Result<bool, ConditionError> {
        let condition_type = node.config_str("conditionType").unwrap_or("comparison");
        match condition_type {
            "comparison" => self.evaluate_comparison(node, ctx),
            "threshold" => self.evaluate_threshold(node, ctx),
            "data-check" => self.evaluate_data_check(node, ctx),
            "expression" => self.evaluate_expression(node, ctx),
            other => Err(ConditionError::UnknownConditionType(other.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Modes
    // -----------------------------------------------------------------------

    fn evaluate_comparison(
        &self,
        node: &WorkflowNode,
        ctx: &ExecutionContext,
    ) -> Result<bool, ConditionError> {
        let field = require_str(node, "field")?;
        let operator = require_str(node, "operator")?;
        let expected = node
            .config
            .get("value")
            .cloned()
            .ok_or_else(|| missing(node, "value"))?;

        let actual = ctx.lookup(field).cloned().unwrap_or(Value::Null);
        apply_operator(operator, &actual, &expected)
    }

    fn evaluate_threshold(
        &self,
        node: &WorkflowNode,
        ctx: &ExecutionContext,
    ) -> Result<bool, ConditionError> {
        let field = require_str(node, "field")?;
        let operator = node
            .config_str("operator")
            .unwrap_or("greater_than_or_equal");
        let threshold = node
            .config
            .get("value")
            .cloned()
            .ok_or_else(|| missing(node, "value"))?;

        let actual = ctx.lookup(field).cloned().unwrap_or(Value::Null);
        match operator {
            "greater_than" | "less_than" | "greater_than_or_equal" | "less_than_or_equal" => {
                apply_operator(operator, &actual, &threshold)
            }
            other => Err(ConditionError::UnknownOperator(other.to_string())),
        }
    }

    fn evaluate_data_check(
        &self,
        node: &WorkflowNode,
        ctx: &ExecutionContext,
    ) -> Result<bool, ConditionError> {
        let field = require_str(node, "field")?;
        let check = node.config_str("check").unwrap_or("exists");
        let value = ctx.lookup(field);

        match check {
            "exists" => Ok(value.is_some_and(|v| !v.is_null())),
            "not_empty" => Ok(value.is_some_and(|v| match v {
                Value::String(s) => !s.is_empty(),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
                Value::Null => false,
                _ => true,
            })),
            "is_success" => Ok(value.is_some_and(|v| match v {
                Value::String(s) => s.eq_ignore_ascii_case("success"),
                Value::Bool(b) => *b,
                _ => false,
            })),
            other => Err(ConditionError::UnknownCheck(other.to_string())),
        }
    }

    fn evaluate_expression(
        &self,
        node: &WorkflowNode,
        ctx: &ExecutionContext,
    ) -> Result<bool, ConditionError> {
        let expression = require_str(node, "expression")?;
        let context = ctx.to_expression_context();
        let result = self
            .evaluator
            .eval_in_context(expression, &context)
            .map_err(|e| ConditionError::Expression(e.to_string()))?;
        Ok(truthy(&result))
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Apply a comparison operator to two JSON values.
///
/// Both operands are normalized to f64 when possible (numbers and numeric
/// strings). Equality between numbers uses `NUMERIC_EPSILON`. Ordering
/// operators on non-numeric operands evaluate to false, never error.
fn apply_operator(operator: &str, actual: &Value, expected: &Value) -> Result<bool, ConditionError> {
    match operator {
        "equals" => Ok(values_equal(actual, expected)),
        "not_equals" => Ok(!values_equal(actual, expected)),
        "greater_than" => Ok(numeric_cmp(actual, expected).is_some_and(|o| o > 0.0)),
        "less_than" => Ok(numeric_cmp(actual, expected).is_some_and(|o| o < 0.0)),
        "greater_than_or_equal" => Ok(numeric_cmp(actual, expected).is_some_and(|o| o >= 0.0)),
        "less_than_or_equal" => Ok(numeric_cmp(actual, expected).is_some_and(|o| o <= 0.0)),
        "contains" => Ok(contains(actual, expected)),
        "starts_with" => Ok(string_pair(actual, expected)
            .is_some_and(|(subject, prefix)| subject.starts_with(prefix))),
        "ends_with" => Ok(string_pair(actual, expected)
            .is_some_and(|(subject, suffix)| subject.ends_with(suffix))),
        other => Err(ConditionError::UnknownOperator(other.to_string())),
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return (a - b).abs() < NUMERIC_EPSILON;
    }
    actual == expected
}

/// Sign of `actual - expected` when both normalize to f64, zeroed within
/// epsilon. `None` when either operand is non-numeric.
fn numeric_cmp(actual: &Value, expected: &Value) -> Option<f64> {
    let (a, b) = (as_number(actual)?, as_number(expected)?);
    let diff = a - b;
    if diff.abs() < NUMERIC_EPSILON {
        Some(0.0)
    } else {
        Some(diff)
    }
}

/// Numbers and numeric strings normalize to f64.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(subject) => expected.as_str().is_some_and(|needle| subject.contains(needle)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
        _ => false,
    }
}

fn string_pair<'a>(actual: &'a Value, expected: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((actual.as_str()?, expected.as_str()?))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn require_str<'a>(node: &'a WorkflowNode, key: &str) -> Result<&'a str, ConditionError> {
    node.config_str(key).ok_or_else(|| missing(node, key))
}

fn missing(node: &WorkflowNode, key: &str) -> ConditionError {
    ConditionError::MissingConfig {
        node: node.id.clone(),
        key: key.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use terraflow_types::workflow::NodeKind;
    use uuid::Uuid;

    use crate::workflow::compensation::CompensationManager;

    fn ctx_with_output(node_id: &str, output: HashMap<String, Value>) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            "analyst@example.com",
            HashMap::new(),
            Arc::new(CompensationManager::new()),
        );
        ctx.record_output(node_id, output).unwrap();
        ctx
    }

    fn decision(config: HashMap<String, Value>) -> WorkflowNode {
        WorkflowNode::new("decide", NodeKind::Decision, config)
    }

    fn comparison(field: &str, operator: &str, value: Value) -> WorkflowNode {
        decision(HashMap::from([
            ("conditionType".to_string(), json!("comparison")),
            ("field".to_string(), json!(field)),
            ("operator".to_string(), json!(operator)),
            ("value".to_string(), value),
        ]))
    }

    // -----------------------------------------------------------------------
    // Comparison mode
    // -----------------------------------------------------------------------

    #[test]
    fn test_numeric_equals_within_epsilon() {
        let ctx = ctx_with_output(
            "ndvi",
            HashMap::from([("mean".to_string(), json!(0.62004))]),
        );
        let eval = ConditionEvaluator::new();
        let node = comparison("ndvi.mean", "equals", json!(0.62));
        assert!(eval.evaluate(&node, &ctx).unwrap());
    }

    #[test]
    fn test_numeric_string_operand_normalized() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([("cloudCover".to_string(), json!("12.5"))]),
        );
        let eval = ConditionEvaluator::new();
        let node = comparison("load.cloudCover", "less_than", json!(20));
        assert!(eval.evaluate(&node, &ctx).unwrap());
    }

    #[test]
    fn test_ordering_on_non_numeric_is_false() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([("sceneId".to_string(), json!("S2A_20260801"))]),
        );
        let eval = ConditionEvaluator::new();
        let node = comparison("load.sceneId", "greater_than", json!(5));
        // never an error, just false
        assert!(!eval.evaluate(&node, &ctx).unwrap());
    }

    #[test]
    fn test_ordering_on_missing_field_is_false() {
        let ctx = ctx_with_output("load", HashMap::new());
        let eval = ConditionEvaluator::new();
        let node = comparison("load.cloudCover", "less_than_or_equal", json!(20));
        assert!(!eval.evaluate(&node, &ctx).unwrap());
    }

    #[test]
    fn test_string_equality_and_negation() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([("region".to_string(), json!("EU"))]),
        );
        let eval = ConditionEvaluator::new();
        assert!(eval
            .evaluate(&comparison("load.region", "equals", json!("EU")), &ctx)
            .unwrap());
        assert!(eval
            .evaluate(&comparison("load.region", "not_equals", json!("US")), &ctx)
            .unwrap());
    }

    #[test]
    fn test_string_operators() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([("sceneId".to_string(), json!("S2A_20260801_T32UNE"))]),
        );
        let eval = ConditionEvaluator::new();
        assert!(eval
            .evaluate(
                &comparison("load.sceneId", "starts_with", json!("S2A")),
                &ctx
            )
            .unwrap());
        assert!(eval
            .evaluate(
                &comparison("load.sceneId", "ends_with", json!("T32UNE")),
                &ctx
            )
            .unwrap());
        assert!(eval
            .evaluate(
                &comparison("load.sceneId", "contains", json!("20260801")),
                &ctx
            )
            .unwrap());
    }

    #[test]
    fn test_array_contains() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([("bands".to_string(), json!(["B04", "B08"]))]),
        );
        let eval = ConditionEvaluator::new();
        let node = comparison("load.bands", "contains", json!("B08"));
        assert!(eval.evaluate(&node, &ctx).unwrap());
    }

    #[test]
    fn test_unknown_operator_errors() {
        let ctx = ctx_with_output("load", HashMap::new());
        let eval = ConditionEvaluator::new();
        let node = comparison("load.x", "matches", json!(1));
        assert!(matches!(
            eval.evaluate(&node, &ctx).unwrap_err(),
            ConditionError::UnknownOperator(_)
        ));
    }

    // -----------------------------------------------------------------------
    // Threshold mode
    // -----------------------------------------------------------------------

    #[test]
    fn test_threshold_default_operator() {
        let ctx = ctx_with_output(
            "ndvi",
            HashMap::from([("mean".to_string(), json!(0.7))]),
        );
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([
            ("conditionType".to_string(), json!("threshold")),
            ("field".to_string(), json!("ndvi.mean")),
            ("value".to_string(), json!(0.5)),
        ]));
        assert!(eval.evaluate(&node, &ctx).unwrap());
    }

    #[test]
    fn test_threshold_rejects_equality_operator() {
        let ctx = ctx_with_output("ndvi", HashMap::new());
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([
            ("conditionType".to_string(), json!("threshold")),
            ("field".to_string(), json!("ndvi.mean")),
            ("operator".to_string(), json!("equals")),
            ("value".to_string(), json!(0.5)),
        ]));
        assert!(matches!(
            eval.evaluate(&node, &ctx).unwrap_err(),
            ConditionError::UnknownOperator(_)
        ));
    }

    // -----------------------------------------------------------------------
    // Data-check mode
    // -----------------------------------------------------------------------

    #[test]
    fn test_data_check_exists() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([("sceneId".to_string(), json!("S2A"))]),
        );
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([
            ("conditionType".to_string(), json!("data-check")),
            ("field".to_string(), json!("load.sceneId")),
            ("check".to_string(), json!("exists")),
        ]));
        assert!(eval.evaluate(&node, &ctx).unwrap());

        let missing = decision(HashMap::from([
            ("conditionType".to_string(), json!("data-check")),
            ("field".to_string(), json!("load.absent")),
            ("check".to_string(), json!("exists")),
        ]));
        assert!(!eval.evaluate(&missing, &ctx).unwrap());
    }

    #[test]
    fn test_data_check_not_empty() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([
                ("scenes".to_string(), json!([])),
                ("region".to_string(), json!("EU")),
            ]),
        );
        let eval = ConditionEvaluator::new();
        let empty = decision(HashMap::from([
            ("conditionType".to_string(), json!("data-check")),
            ("field".to_string(), json!("load.scenes")),
            ("check".to_string(), json!("not_empty")),
        ]));
        assert!(!eval.evaluate(&empty, &ctx).unwrap());

        let filled = decision(HashMap::from([
            ("conditionType".to_string(), json!("data-check")),
            ("field".to_string(), json!("load.region")),
            ("check".to_string(), json!("not_empty")),
        ]));
        assert!(eval.evaluate(&filled, &ctx).unwrap());
    }

    #[test]
    fn test_data_check_is_success() {
        let ctx = ctx_with_output(
            "ndvi",
            HashMap::from([("status".to_string(), json!("SUCCESS"))]),
        );
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([
            ("conditionType".to_string(), json!("data-check")),
            ("field".to_string(), json!("ndvi.status")),
            ("check".to_string(), json!("is_success")),
        ]));
        assert!(eval.evaluate(&node, &ctx).unwrap());
    }

    // -----------------------------------------------------------------------
    // Expression mode
    // -----------------------------------------------------------------------

    #[test]
    fn test_expression_mode() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([("cloudCover".to_string(), json!(12.5))]),
        );
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([
            ("conditionType".to_string(), json!("expression")),
            (
                "expression".to_string(),
                json!("nodes.load.cloudCover < 20"),
            ),
        ]));
        assert!(eval.evaluate(&node, &ctx).unwrap());
    }

    #[test]
    fn test_expression_with_transform() {
        let ctx = ctx_with_output(
            "load",
            HashMap::from([("region".to_string(), json!("eu"))]),
        );
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([
            ("conditionType".to_string(), json!("expression")),
            (
                "expression".to_string(),
                json!("nodes.load.region|upper == 'EU'"),
            ),
        ]));
        assert!(eval.evaluate(&node, &ctx).unwrap());
    }

    #[test]
    fn test_expression_failure_is_error() {
        let ctx = ctx_with_output("load", HashMap::new());
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([
            ("conditionType".to_string(), json!("expression")),
            ("expression".to_string(), json!("((")),
        ]));
        assert!(matches!(
            eval.evaluate(&node, &ctx).unwrap_err(),
            ConditionError::Expression(_)
        ));
    }

    // -----------------------------------------------------------------------
    // Config errors
    // -----------------------------------------------------------------------

    #[test]
    fn test_unknown_condition_type() {
        let ctx = ctx_with_output("load", HashMap::new());
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([(
            "conditionType".to_string(),
            json!("fuzzy"),
        )]));
        assert!(matches!(
            eval.evaluate(&node, &ctx).unwrap_err(),
            ConditionError::UnknownConditionType(_)
        ));
    }

    #[test]
    fn test_missing_field_config() {
        let ctx = ctx_with_output("load", HashMap::new());
        let eval = ConditionEvaluator::new();
        let node = decision(HashMap::from([(
            "conditionType".to_string(),
            json!("comparison"),
        )]));
        assert!(matches!(
            eval.evaluate(&node, &ctx).unwrap_err(),
            ConditionError::MissingConfig { .. }
        ));
    }
}
