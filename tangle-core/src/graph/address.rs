//! Choice Point Addresses
//!
//! Every choice point is named by a hierarchical address. Ordinary nodes
//! are addressed by the dynamic call path: a node created while another
//! node's body runs lives underneath that node. Memoized nodes are
//! addressed by their tag and arguments instead, so equal arguments
//! resolve to the same node no matter where the call happens.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::value::Value;
use crate::error::{EngineError, Result};

/// One step of an address path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// A named child.
    Name(Arc<str>),
    /// A positional child, typically a loop index.
    Index(u64),
    /// A memoized call: tag plus canonical encoding of the arguments.
    Memo { tag: Arc<str>, key: Arc<str> },
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Name(name) => write!(f, "{name}"),
            Segment::Index(index) => write!(f, "{index}"),
            Segment::Memo { tag, key } => write!(f, "{tag}{key}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(name: &str) -> Self {
        Segment::Name(Arc::from(name))
    }
}

impl From<String> for Segment {
    fn from(name: String) -> Self {
        Segment::Name(Arc::from(name))
    }
}

impl From<u64> for Segment {
    fn from(index: u64) -> Self {
        Segment::Index(index)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index as u64)
    }
}

/// Hierarchical name of a choice point. Unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address {
    segments: SmallVec<[Segment; 4]>,
}

impl Address {
    /// The empty address; the scope of top-level program code.
    pub fn root() -> Self {
        Self::default()
    }

    /// Address of a memoized node. Equal `(tag, args)` give equal addresses.
    ///
    /// `-0.0` and `0.0` are the same argument. Non-finite reals are
    /// rejected, since they have no distinct encoding.
    pub fn memo(tag: &str, args: &[Value]) -> Result<Self> {
        let args = args
            .iter()
            .map(|arg| canonical(tag, arg))
            .collect::<Result<Vec<_>>>()?;
        let key = serde_json::to_string(&args)
            .map_err(|e| EngineError::config(format!("memo arguments for `{tag}`: {e}")))?;
        let mut segments = SmallVec::new();
        segments.push(Segment::Memo {
            tag: Arc::from(tag),
            key: Arc::from(key),
        });
        Ok(Self { segments })
    }

    /// Extend this address by one segment.
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Path segments from the top.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether this is the empty path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `self` lies underneath `ancestor` (or equals it).
    pub fn starts_with(&self, ancestor: &Address) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

fn canonical_real(tag: &str, x: f64) -> Result<f64> {
    if !x.is_finite() {
        return Err(EngineError::config(format!(
            "memo arguments for `{tag}` must be finite, got {x}"
        )));
    }
    // folds -0.0 into 0.0
    Ok(if x == 0.0 { 0.0 } else { x })
}

fn canonical(tag: &str, value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Real(x) => Value::Real(canonical_real(tag, *x)?),
        Value::Vector(xs) => Value::Vector(
            xs.iter()
                .map(|x| canonical_real(tag, *x))
                .collect::<Result<_>>()?,
        ),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| canonical(tag, item))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}
