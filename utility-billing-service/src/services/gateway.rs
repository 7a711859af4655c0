//! Row store contract: generic CRUD over named collections with
//! PostgREST-style filter conditions.

use crate::error::{BillingError, BillingResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Is,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Is => "is",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            Operator::Is => match (&self.value, actual) {
                (Value::Null, Value::Null) => true,
                (Value::Bool(expected), Value::Bool(actual)) => expected == actual,
                _ => false,
            },
            Operator::Eq => loosely_equal(actual, &self.value),
            Operator::Neq => !actual.is_null() && !loosely_equal(actual, &self.value),
            Operator::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            Operator::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}", self.column, self.op.as_str(), render(&self.value))
    }
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: i64) -> Self {
        Self::new().eq("id", id)
    }

    pub fn with(mut self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(column, Operator::Eq, value)
    }

    /// Compare-and-set guard on `version`. Rows that were never versioned
    /// hold null there and are matched with `is.null`.
    pub fn at_version(self, version: Option<i64>) -> Self {
        match version {
            Some(version) => self.eq("version", version),
            None => self.with("version", Operator::Is, Value::Null),
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Query string pairs in PostgREST form, e.g. `("status", "eq.Pending")`.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.conditions
            .iter()
            .map(|c| {
                (
                    c.column.clone(),
                    format!("{}.{}", c.op.as_str(), render(&c.value)),
                )
            })
            .collect()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join("&"))
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Numbers may come back as JSON numbers or as numeric strings (decimal
/// columns), so both sides are compared numerically when they can be.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!((as_number(a), as_number(b)), (Some(x), Some(y)) if x == y)
        }
        _ => render(a) == render(b),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn get(&self, collection: &str, filter: &Filter) -> BillingResult<Vec<Record>>;

    async fn insert(&self, collection: &str, record: Record) -> BillingResult<Record>;

    /// Conditional update. Returns only the rows the filter matched at write
    /// time, so an empty result means the guard did not hold.
    async fn update_where(
        &self,
        collection: &str,
        filter: &Filter,
        partial: Record,
    ) -> BillingResult<Vec<Record>>;

    async fn get_one(&self, collection: &str, id: i64) -> BillingResult<Option<Record>> {
        Ok(self
            .get(collection, &Filter::by_id(id))
            .await?
            .into_iter()
            .next())
    }
}

/// Version to write after a guarded update; an unversioned row starts at 1.
pub fn next_version(current: Option<i64>) -> i64 {
    current.map_or(1, |version| version + 1)
}

pub fn to_record<T: Serialize>(value: &T) -> BillingResult<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(BillingError::validation("record must serialize to an object")),
        Err(e) => Err(BillingError::validation(format!("unserializable record: {}", e))),
    }
}

pub fn from_record<T: DeserializeOwned>(collection: &str, record: Record) -> BillingResult<T> {
    serde_json::from_value(Value::Object(record)).map_err(|e| {
        BillingError::gateway(
            "decode",
            format!("malformed {} row: {}", collection, e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_query_pairs_render_postgrest_style() {
        let filter = Filter::by_id(7)
            .eq("status", "Pending")
            .with("version", Operator::Lte, 3)
            .with("deleted_at", Operator::Is, Value::Null);

        assert_eq!(
            filter.to_query_pairs(),
            vec![
                ("id".to_string(), "eq.7".to_string()),
                ("status".to_string(), "eq.Pending".to_string()),
                ("version".to_string(), "lte.3".to_string()),
                ("deleted_at".to_string(), "is.null".to_string()),
            ]
        );
        assert_eq!(filter.to_string(), "id=eq.7&status=eq.Pending&version=lte.3&deleted_at=is.null");
    }

    #[test]
    fn test_matches_compares_decimal_strings_numerically() {
        let row = record(json!({"id": 1, "remaining_balance": "500.00", "status": "Partial"}));

        assert!(Filter::new().eq("remaining_balance", 500).matches(&row));
        assert!(Filter::new()
            .with("remaining_balance", Operator::Gt, 100)
            .matches(&row));
        assert!(!Filter::new()
            .with("remaining_balance", Operator::Lt, "20")
            .matches(&row));
        assert!(Filter::new().eq("id", "1").matches(&row));
    }

    #[test]
    fn test_missing_column_only_matches_is_null() {
        let row = record(json!({"id": 1}));

        assert!(Filter::new()
            .with("approved_at", Operator::Is, Value::Null)
            .matches(&row));
        assert!(!Filter::new().eq("approved_at", "x").matches(&row));
        assert!(!Filter::new().with("approved_at", Operator::Neq, "x").matches(&row));
    }

    #[test]
    fn test_version_guard_matches_unversioned_rows() {
        let legacy = record(json!({"id": 7, "status": "Open"}));
        let versioned = record(json!({"id": 7, "status": "Open", "version": 2}));

        let unversioned_guard = Filter::by_id(7).at_version(None);
        assert!(unversioned_guard.matches(&legacy));
        assert!(!unversioned_guard.matches(&versioned));
        assert_eq!(unversioned_guard.to_string(), "id=eq.7&version=is.null");

        let guard = Filter::by_id(7).at_version(Some(2));
        assert!(guard.matches(&versioned));
        assert!(!guard.matches(&legacy));

        assert_eq!(next_version(None), 1);
        assert_eq!(next_version(Some(2)), 3);
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::new().matches(&record(json!({"anything": true}))));
    }

    #[test]
    fn test_from_record_reports_malformed_rows() {
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct Row {
            id: i64,
        }

        let err = from_record::<Row>("bills", record(json!({"id": "seven"}))).unwrap_err();
        assert_eq!(err.kind(), "GatewayError");
        assert!(err.to_string().contains("malformed bills row"));
    }
}
