use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Current time as Unix milliseconds.
///
/// Centralized so every persisted timestamp in the workspace comes from the
/// same clock source.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// A value that can be queried via [`Filter`].
///
/// Only the variants a collection actually indexes on need to be produced by
/// [`Record::indexed_fields`]; the store does not require every field of a
/// record to be indexed.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl IndexValue {
    fn type_tag(&self) -> &'static str {
        match self {
            IndexValue::String(_) => "s",
            IndexValue::Int(_) => "i",
            IndexValue::Bool(_) => "b",
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            IndexValue::String(s) => Some(s.clone()),
            IndexValue::Bool(b) => Some(b.to_string()),
            IndexValue::Int(_) => None,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            IndexValue::Int(i) => Some(*i),
            IndexValue::Bool(b) => Some(*b as i64),
            IndexValue::String(_) => None,
        }
    }
}

/// Comparison operator for a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOp {
    fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
        }
    }
}

/// A single equality/comparison predicate evaluated against a record's
/// indexed fields.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }

    pub(crate) fn sql_fragment(&self) -> (&'static str, String, rusqlite::types::Value) {
        let column = match &self.value {
            IndexValue::Int(_) => "value_int",
            IndexValue::String(_) | IndexValue::Bool(_) => "value_text",
        };
        let value = match &self.value {
            IndexValue::Int(i) => rusqlite::types::Value::Integer(*i),
            IndexValue::String(_) | IndexValue::Bool(_) => {
                rusqlite::types::Value::Text(self.value.as_text().unwrap_or_default())
            }
        };
        (self.op.sql(), column.to_string(), value)
    }
}

/// Contract implemented by every type persisted through a [`crate::Store`].
///
/// Mirrors the shape used throughout this workspace: a stable id, a
/// monotonically-increasing `updated_at`, a fixed collection name, and a set
/// of fields the store should be able to filter on without deserializing
/// every row.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn updated_at(&self) -> i64;

    fn collection_name() -> &'static str
    where
        Self: Sized;

    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

pub(crate) fn index_value_type_tag(value: &IndexValue) -> &'static str {
    value.type_tag()
}

pub(crate) fn index_value_int(value: &IndexValue) -> Option<i64> {
    value.as_int()
}

pub(crate) fn index_value_text(value: &IndexValue) -> Option<String> {
    value.as_text()
}
