use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use thiserror::Error;

use super::expression::{FormulaExpression, FormulaTable, TableValue};
use crate::expr;

/// Named numeric inputs of a formula.
pub type Variables = HashMap<String, f64>;

static VARIABLE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn variable_regex() -> Option<&'static Regex> {
    VARIABLE_REGEX
        .get_or_init(|| Regex::new(r"\[([A-Za-z_][A-Za-z0-9_.\-]*)\]").ok())
        .as_ref()
}

/// Replace every `[name]` with its value, or `0` when the variable is unknown.
pub fn substitute_variables(text: &str, variables: &Variables) -> String {
    let Some(regex) = variable_regex() else {
        return text.to_string();
    };
    regex
        .replace_all(text, |caps: &Captures| {
            let value = variables.get(&caps[1]).copied().unwrap_or(0.0);
            format_number(value)
        })
        .into_owned()
}

/// Render a number the way the evaluator reads it back.
fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value < 0.0 {
        format!("({})", value)
    } else {
        format!("{}", value)
    }
}

/// Evaluate a stored formula (plain expression or table) against `variables`.
///
/// Returns `None` for an empty formula or anything that does not evaluate.
pub fn evaluate(formula: &str, variables: &Variables) -> Option<f64> {
    match FormulaExpression::decode(formula)? {
        FormulaExpression::Expression(text) => evaluate_expression(&text, variables),
        FormulaExpression::Table(table) => evaluate_table(&table, variables),
    }
}

fn evaluate_expression(text: &str, variables: &Variables) -> Option<f64> {
    expr::evaluate(&substitute_variables(text, variables))
}

fn evaluate_table(table: &FormulaTable, variables: &Variables) -> Option<f64> {
    let reference = variables
        .get(table.reference_variable())
        .copied()
        .unwrap_or(0.0);

    match &table.select(reference)?.value {
        TableValue::Number(n) => Some(*n),
        TableValue::Expression(text) => evaluate_expression(text, variables),
    }
}

/// Human-readable problems with a stored formula; empty when it is usable.
pub fn validate_formula(formula: &str) -> Vec<String> {
    let Some(decoded) = FormulaExpression::decode(formula) else {
        return Vec::new();
    };

    match decoded {
        FormulaExpression::Expression(text) => validate_expression(&text),
        FormulaExpression::Table(table) => {
            let mut errors = Vec::new();
            if table.reference_variable().trim().is_empty() {
                errors.push("table formula has no reference variable".to_string());
            }
            if table.entries().is_empty() {
                errors.push("table formula has no entries".to_string());
            }
            for key in table.ignored_keys() {
                errors.push(format!(
                    "table key '{}' is not a numeric threshold with a number or expression value",
                    key
                ));
            }
            for entry in table.entries() {
                if let TableValue::Expression(text) = &entry.value {
                    errors.extend(
                        validate_expression(text)
                            .into_iter()
                            .map(|e| format!("entry {}: {}", entry.threshold_from, e)),
                    );
                }
            }
            errors
        }
    }
}

fn validate_expression(text: &str) -> Vec<String> {
    let substituted = substitute_variables(text, &Variables::new());
    let errors = expr::validate(&substituted);
    if !errors.is_empty() {
        return errors.iter().map(ToString::to_string).collect();
    }
    match expr::parse(&substituted) {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    }
}

/// Most values `evaluate_for_variable_range` will step through.
pub const MAX_RANGE_STEPS: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("range {low}..={high} has more than {MAX_RANGE_STEPS} steps")]
pub struct RangeTooLarge {
    pub low: i64,
    pub high: i64,
}

/// Evaluate `formula` once per integer value of `variable` in `[min, max]`.
///
/// Bounds given in reverse are swapped; steps that do not evaluate yield `0.0`.
/// Ranges wider than [`MAX_RANGE_STEPS`] are rejected before anything is
/// evaluated.
pub fn evaluate_for_variable_range(
    formula: &str,
    variable: &str,
    min: i64,
    max: i64,
    base_variables: &Variables,
) -> Result<BTreeMap<i64, f64>, RangeTooLarge> {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    let steps = (high as i128) - (low as i128) + 1;
    if steps > MAX_RANGE_STEPS as i128 {
        return Err(RangeTooLarge { low, high });
    }

    let mut variables = base_variables.clone();
    Ok((low..=high)
        .map(|step| {
            variables.insert(variable.to_string(), step as f64);
            (step, evaluate(formula, &variables).unwrap_or(0.0))
        })
        .collect())
}
