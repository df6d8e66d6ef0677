//! Runtime values carried by choice points.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{EngineError, Result};

/// A dynamically typed value produced by a choice point.
///
/// Equality is what the propagator uses to decide whether a recomputed
/// deterministic node changed, and what conditioning uses to compare
/// observations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Real(f64),
    Vector(Vec<f64>),
    List(Vec<Value>),
}

/// Parameters of a probabilistic node, as returned by its parameter closure.
pub type Params = SmallVec<[Value; 4]>;

/// Build a [`Params`] list from anything convertible into values.
pub fn params<I, V>(items: I) -> Params
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    items.into_iter().map(Into::into).collect()
}

impl Value {
    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Vector(_) => "vector",
            Value::List(_) => "list",
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }

    /// Integer view.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(mismatch("int", other)),
        }
    }

    /// Numeric view; integers widen to reals.
    pub fn as_real(&self) -> Result<f64> {
        match self {
            Value::Real(x) => Ok(*x),
            Value::Int(i) => Ok(*i as f64),
            other => Err(mismatch("real", other)),
        }
    }

    /// Real vector view.
    pub fn as_vector(&self) -> Result<&[f64]> {
        match self {
            Value::Vector(v) => Ok(v),
            other => Err(mismatch("vector", other)),
        }
    }

    /// List view.
    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(mismatch("list", other)),
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> EngineError {
    EngineError::config(format!(
        "expected a {expected} value, found {}",
        found.type_name()
    ))
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}
