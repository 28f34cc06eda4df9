//! # Query Model
//!
//! Filter, sort, page, and aggregate shapes accepted by the metadata store.
//! Conditions translate to database filters (or are evaluated in memory by
//! the dev store); the aggregate form covers the listing and statistics
//! surfaces of the service layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator of a single filter condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Not,
    In,
    /// Case-insensitive substring match.
    Contains,
}

/// One filter condition: `key <op> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub value: Value,
    pub op: FilterOp,
}

impl Condition {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition {
            key: key.into(),
            value: value.into(),
            op: FilterOp::Eq,
        }
    }

    pub fn not(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition {
            key: key.into(),
            value: value.into(),
            op: FilterOp::Not,
        }
    }

    pub fn contains(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition {
            key: key.into(),
            value: value.into(),
            op: FilterOp::Contains,
        }
    }

    pub fn any_of(key: impl Into<String>, values: Vec<String>) -> Self {
        Condition {
            key: key.into(),
            value: Value::Array(values.into_iter().map(Value::String).collect()),
            op: FilterOp::In,
        }
    }
}

/// Sort order for `query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub key: String,
    #[serde(default)]
    pub desc: bool,
}

/// Pagination window. `start` is a zero-based offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub start: u64,
    pub limit: u64,
}

/// Listing query: filters, an optional keyword searched over the record
/// kind's search fields, sorting, and paging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub filter: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
}

/// Grouping key of an aggregate stage: group by `key`, emit as `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKey {
    pub key: String,
    pub name: String,
}

/// Aggregate stage executed by `stat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Total record count emitted under the given name.
    Count { name: String },
    /// Group records by keys and count each bucket under `count_name`.
    Group {
        keys: Vec<GroupKey>,
        count_name: String,
    },
}

/// Statistics query: filters plus one aggregate stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatQuery {
    #[serde(default)]
    pub filter: Vec<Condition>,
    pub aggregate: Aggregate,
}
