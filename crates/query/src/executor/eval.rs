//! Expression evaluation over rows.
//!
//! Nulls propagate through every operator except AND, OR, IS NULL and CASE.
//! Conversions are permissive: arithmetic overflow and division by zero
//! yield null, and pattern operators stringify non-string operands.

use crate::analyzer::{BoundExpr, BoundExprKind};
use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{ExecutionError, ExecutionResult};
use quarry_core::pattern_match;
use quarry_core::Value;
use regex::Regex;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Evaluates bound expressions. Compiled RLIKE patterns are cached for the
/// lifetime of the evaluator.
#[derive(Debug, Default)]
pub struct ExprEvaluator {
    regexes: RefCell<HashMap<String, Regex>>,
}

impl ExprEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates an expression against a row.
    pub fn eval(&self, expr: &BoundExpr, row: &[Value]) -> ExecutionResult<Value> {
        match &expr.kind {
            BoundExprKind::Literal(value) => Ok(value.clone()),

            BoundExprKind::Column { index, .. } => Ok(row.get(*index).cloned().unwrap_or(Value::Null)),

            BoundExprKind::Binary { left, op, right } => {
                let left_val = self.eval(left, row)?;
                let right_val = self.eval(right, row)?;
                self.eval_binary_op(*op, &left_val, &right_val)
            }

            BoundExprKind::Unary { op, expr } => {
                let val = self.eval(expr, row)?;
                Ok(eval_unary_op(*op, &val))
            }

            BoundExprKind::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let val = self.eval(expr, row)?;
                let low_val = self.eval(low, row)?;
                let high_val = self.eval(high, row)?;
                if val.is_null() || low_val.is_null() || high_val.is_null() {
                    return Ok(Value::Null);
                }
                let inside = val >= low_val && val <= high_val;
                Ok(Value::Boolean(inside != *negated))
            }

            BoundExprKind::InList { expr, list, negated } => {
                let val = self.eval(expr, row)?;
                if val.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let item_val = self.eval(item, row)?;
                    if item_val.is_null() {
                        saw_null = true;
                    } else if val.cmp(&item_val) == Ordering::Equal {
                        return Ok(Value::Boolean(!*negated));
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Boolean(*negated)
                })
            }

            BoundExprKind::IsNull { expr, negated } => {
                let val = self.eval(expr, row)?;
                Ok(Value::Boolean(val.is_null() != *negated))
            }

            BoundExprKind::Case { branches, else_expr } => {
                for (when, then) in branches {
                    if let Value::Boolean(true) = self.eval(when, row)? {
                        return self.eval(then, row);
                    }
                }
                match else_expr {
                    Some(e) => self.eval(e, row),
                    None => Ok(Value::Null),
                }
            }

            BoundExprKind::Function { function, args } => {
                let arg_values = args
                    .iter()
                    .map(|a| self.eval(a, row))
                    .collect::<ExecutionResult<Vec<Value>>>()?;
                Ok(function.0.invoke(&arg_values))
            }

            BoundExprKind::Aggregate { func, .. } => Err(ExecutionError::InvalidOperation(format!(
                "aggregate {} evaluated outside an aggregation",
                func
            ))),
        }
    }

    /// Evaluates a predicate. Null and non-boolean results count as false.
    #[inline]
    pub fn eval_predicate(&self, expr: &BoundExpr, row: &[Value]) -> ExecutionResult<bool> {
        Ok(matches!(self.eval(expr, row)?, Value::Boolean(true)))
    }

    /// Evaluates every expression of a list.
    pub fn eval_all(&self, exprs: &[BoundExpr], row: &[Value]) -> ExecutionResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, row)).collect()
    }

    fn eval_binary_op(&self, op: BinaryOp, left: &Value, right: &Value) -> ExecutionResult<Value> {
        // Handle NULL propagation
        if left.is_null() || right.is_null() {
            return Ok(match op {
                BinaryOp::And => {
                    // NULL AND FALSE = FALSE, NULL AND TRUE = NULL
                    if let Value::Boolean(false) = left {
                        return Ok(Value::Boolean(false));
                    }
                    if let Value::Boolean(false) = right {
                        return Ok(Value::Boolean(false));
                    }
                    Value::Null
                }
                BinaryOp::Or => {
                    // NULL OR TRUE = TRUE, NULL OR FALSE = NULL
                    if let Value::Boolean(true) = left {
                        return Ok(Value::Boolean(true));
                    }
                    if let Value::Boolean(true) = right {
                        return Ok(Value::Boolean(true));
                    }
                    Value::Null
                }
                _ => Value::Null,
            });
        }

        let result = match op {
            BinaryOp::Eq => Value::Boolean(left.cmp(right) == Ordering::Equal),
            BinaryOp::Ne => Value::Boolean(left.cmp(right) != Ordering::Equal),
            BinaryOp::Lt => Value::Boolean(left < right),
            BinaryOp::Le => Value::Boolean(left <= right),
            BinaryOp::Gt => Value::Boolean(left > right),
            BinaryOp::Ge => Value::Boolean(left >= right),
            BinaryOp::And => match (left, right) {
                (Value::Boolean(l), Value::Boolean(r)) => Value::Boolean(*l && *r),
                _ => Value::Null,
            },
            BinaryOp::Or => match (left, right) {
                (Value::Boolean(l), Value::Boolean(r)) => Value::Boolean(*l || *r),
                _ => Value::Null,
            },
            BinaryOp::Add => match (left, right) {
                (Value::String(l), Value::String(r)) => Value::String(format!("{}{}", l, r)),
                _ => eval_arithmetic(left, right, i64::checked_add, |a, b| a + b),
            },
            BinaryOp::Sub => eval_arithmetic(left, right, i64::checked_sub, |a, b| a - b),
            BinaryOp::Mul => eval_arithmetic(left, right, i64::checked_mul, |a, b| a * b),
            BinaryOp::Div => {
                // Check for division by zero
                match right {
                    Value::Int32(0) | Value::Int64(0) => Value::Null,
                    Value::Float64(f) if *f == 0.0 => Value::Null,
                    _ => eval_arithmetic(left, right, i64::checked_div, |a, b| a / b),
                }
            }
            BinaryOp::Mod => match right {
                Value::Int32(0) | Value::Int64(0) => Value::Null,
                Value::Float64(f) if *f == 0.0 => Value::Null,
                _ => eval_arithmetic(left, right, i64::checked_rem, |a, b| a % b),
            },
            BinaryOp::Like | BinaryOp::NotLike => {
                let matched = pattern_match::like(&stringify(left), &stringify(right));
                Value::Boolean(matched == (op == BinaryOp::Like))
            }
            BinaryOp::Rlike | BinaryOp::NotRlike => {
                let matched = self.match_regex(&stringify(left), &stringify(right))?;
                Value::Boolean(matched == (op == BinaryOp::Rlike))
            }
            BinaryOp::Contains => Value::Boolean(pattern_match::contains(&stringify(left), &stringify(right))),
        };
        Ok(result)
    }

    fn match_regex(&self, value: &str, pattern: &str) -> ExecutionResult<bool> {
        let mut cache = self.regexes.borrow_mut();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.is_match(value));
        }
        let regex = Regex::new(pattern).map_err(|e| ExecutionError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let matched = regex.is_match(value);
        cache.insert(pattern.to_string(), regex);
        Ok(matched)
    }
}

/// Integer operands keep an integer result, narrowed to `Int32` only when
/// both sides are `Int32`. Overflow yields null.
fn eval_arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Value {
    match (left, right) {
        (Value::Int32(a), Value::Int32(b)) => int_op(i64::from(*a), i64::from(*b))
            .and_then(|r| i32::try_from(r).ok())
            .map_or(Value::Null, Value::Int32),
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            match (left.as_i64(), right.as_i64()) {
                (Some(a), Some(b)) => int_op(a, b).map_or(Value::Null, Value::Int64),
                _ => Value::Null,
            }
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => {
                let result = float_op(a, b);
                if result.is_finite() {
                    Value::Float64(result)
                } else {
                    Value::Null
                }
            }
            _ => Value::Null,
        },
    }
}

fn eval_unary_op(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Not => match value {
            Value::Boolean(b) => Value::Boolean(!b),
            _ => Value::Null,
        },
        UnaryOp::Neg => match value {
            Value::Int32(i) => i.checked_neg().map_or(Value::Null, Value::Int32),
            Value::Int64(i) => i.checked_neg().map_or(Value::Null, Value::Int64),
            Value::Float64(f) => Value::Float64(-f),
            _ => Value::Null,
        },
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
