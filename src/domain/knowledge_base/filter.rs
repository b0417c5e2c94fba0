//! Metadata filtering for knowledge base search steps
//!
//! A filter is a single-level list of conditions joined by one connector. The step
//! editor works on flat rows of raw text; [`parse_rows`] types those values and
//! [`to_rows`] turns a stored filter back into rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

/// Errors raised while reading filter documents
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterError {
    #[error("Unknown filter operator: {0}")]
    UnknownOperator(String),

    #[error("Unknown filter connector: {0}")]
    UnknownConnector(String),

    #[error("Malformed filter: {0}")]
    Malformed(String),
}

/// Comparison operators for metadata filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal to
    Gte,
    /// Less than
    Lt,
    /// Less than or equal to
    Lte,
    /// Contains (for strings or arrays)
    Contains,
    /// Starts with (for strings)
    StartsWith,
    /// Ends with (for strings)
    EndsWith,
    /// In list of values
    In,
    /// Not in list of values
    NotIn,
    /// Exists (field is present)
    Exists,
    /// Not exists (field is not present)
    NotExists,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 13] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::In,
        Self::NotIn,
        Self::Exists,
        Self::NotExists,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
        }
    }

    /// Whether the operator compares against a value
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::Exists | Self::NotExists)
    }

    /// Whether the operator compares against a list of values
    pub fn is_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl FromStr for FilterOperator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| FilterError::UnknownOperator(s.to_string()))
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Ne => write!(f, "!="),
            Self::Gt => write!(f, ">"),
            Self::Gte => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Lte => write!(f, "<="),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Logical connector joining the conditions of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterConnector {
    #[default]
    And,
    Or,
}

impl FilterConnector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl FromStr for FilterConnector {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(FilterError::UnknownConnector(other.to_string())),
        }
    }
}

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Metadata field key
    pub key: String,
    /// Comparison operator
    pub operator: FilterOperator,
    /// Value to compare against (absent for Exists/NotExists)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl FilterCondition {
    pub fn new(key: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        let value = operator.takes_value().then(|| value.into());

        Self {
            key: key.into(),
            operator,
            value,
        }
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: FilterOperator::Exists,
            value: None,
        }
    }

    pub fn not_exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: FilterOperator::NotExists,
            value: None,
        }
    }
}

/// A metadata filter: conditions joined by one connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpression {
    #[serde(default)]
    pub connector: FilterConnector,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
}

impl FilterExpression {
    pub fn new(connector: FilterConnector, filters: Vec<FilterCondition>) -> Self {
        Self { connector, filters }
    }

    pub fn and(filters: Vec<FilterCondition>) -> Self {
        Self::new(FilterConnector::And, filters)
    }

    pub fn or(filters: Vec<FilterCondition>) -> Self {
        Self::new(FilterConnector::Or, filters)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Load a stored filter document
    ///
    /// Accepts the `{connector, filters}` form and a bare condition object. Conditions
    /// with an empty key are dropped; `None` means no usable condition remains.
    pub fn from_json(value: &Value) -> Result<Option<Self>, FilterError> {
        let obj = match value {
            Value::Null => return Ok(None),
            Value::Object(obj) => obj,
            other => {
                return Err(FilterError::Malformed(format!(
                    "expected an object, got {}",
                    other
                )));
            }
        };

        if obj.contains_key("key") && obj.contains_key("operator") {
            let condition = parse_condition(value)?;
            return Ok((!condition.key.is_empty()).then(|| Self::and(vec![condition])));
        }

        let connector = match obj.get("connector") {
            None | Some(Value::Null) => FilterConnector::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(FilterError::Malformed(format!(
                    "connector must be a string, got {}",
                    other
                )));
            }
        };

        let filters = match obj.get("filters") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_condition)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(FilterError::Malformed(format!(
                    "filters must be an array, got {}",
                    other
                )));
            }
        };

        let filters: Vec<_> = filters.into_iter().filter(|c| !c.key.is_empty()).collect();

        Ok((!filters.is_empty()).then(|| Self::new(connector, filters)))
    }
}

fn parse_condition(value: &Value) -> Result<FilterCondition, FilterError> {
    let key = value
        .get("key")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let operator = value
        .get("operator")
        .and_then(Value::as_str)
        .ok_or_else(|| FilterError::Malformed(format!("condition without operator: {}", value)))?
        .parse::<FilterOperator>()?;

    let value = if operator.takes_value() {
        Some(value.get("value").cloned().unwrap_or(Value::Null))
    } else {
        None
    };

    Ok(FilterCondition {
        key,
        operator,
        value,
    })
}

/// One row of the filter editor: raw text as typed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRow {
    pub key: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub raw_value: String,
}

impl FilterRow {
    pub fn new(key: impl Into<String>, operator: FilterOperator, raw_value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            raw_value: raw_value.into(),
        }
    }
}

/// Build a filter from editor rows, joined with `and`
pub fn parse_rows(rows: &[FilterRow]) -> Option<FilterExpression> {
    parse_rows_with(FilterConnector::And, rows)
}

/// Build a filter from editor rows
///
/// Rows with a blank key are dropped. Returns `None` when no row remains so the
/// caller omits the filter entirely.
pub fn parse_rows_with(connector: FilterConnector, rows: &[FilterRow]) -> Option<FilterExpression> {
    let filters: Vec<FilterCondition> = rows
        .iter()
        .filter(|row| !row.key.trim().is_empty())
        .map(|row| {
            let value = if !row.operator.takes_value() {
                None
            } else if row.operator.is_list() {
                Some(parse_list_value(&row.raw_value))
            } else {
                Some(parse_simple_value(&row.raw_value))
            };

            FilterCondition {
                key: row.key.trim().to_string(),
                operator: row.operator,
                value,
            }
        })
        .collect();

    if filters.is_empty() {
        None
    } else {
        Some(FilterExpression::new(connector, filters))
    }
}

/// Turn a filter back into editor rows
pub fn to_rows(filter: &FilterExpression) -> Vec<FilterRow> {
    filter
        .filters
        .iter()
        .map(|condition| {
            let raw_value = match &condition.value {
                None => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };

            FilterRow::new(condition.key.as_str(), condition.operator, raw_value)
        })
        .collect()
}

/// Type a raw value: booleans, null and number-like text become JSON scalars
pub fn parse_simple_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => parse_number(raw).unwrap_or_else(|| Value::String(raw.to_string())),
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return None;
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }

    let n = trimmed.parse::<f64>().ok().filter(|n| n.is_finite())?;

    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        return Some(Value::Number((n as i64).into()));
    }

    Number::from_f64(n).map(Value::Number)
}

/// Type a raw list value for `in` / `not_in`
///
/// Text starting with `[` is read as a JSON array first; anything else, or an array
/// that fails to parse, is split on commas and each element typed on its own.
pub fn parse_list_value(raw: &str) -> Value {
    let trimmed = raw.trim();

    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<Value>>(trimmed) {
            return Value::Array(items);
        }
    }

    Value::Array(
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(parse_simple_value)
            .collect(),
    )
}

/// Builder for metadata filters
#[derive(Debug, Default)]
pub struct FilterBuilder {
    filters: Vec<FilterCondition>,
    connector: FilterConnector,
}

impl FilterBuilder {
    /// Create a new filter builder (defaults to AND connector)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder that uses OR connector
    pub fn or() -> Self {
        Self {
            filters: Vec::new(),
            connector: FilterConnector::Or,
        }
    }

    fn push(mut self, key: impl Into<String>, op: FilterOperator, value: impl Into<Value>) -> Self {
        self.filters.push(FilterCondition::new(key, op, value));
        self
    }

    pub fn eq(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::Eq, value)
    }

    pub fn ne(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::Ne, value)
    }

    pub fn gt(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::Gt, value)
    }

    pub fn gte(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::Gte, value)
    }

    pub fn lt(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::Lt, value)
    }

    pub fn lte(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::Lte, value)
    }

    pub fn contains(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::Contains, value)
    }

    pub fn starts_with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::StartsWith, value)
    }

    pub fn ends_with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, FilterOperator::EndsWith, value)
    }

    pub fn in_list(self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(key, FilterOperator::In, Value::Array(values))
    }

    pub fn not_in_list(self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(key, FilterOperator::NotIn, Value::Array(values))
    }

    pub fn exists(mut self, key: impl Into<String>) -> Self {
        self.filters.push(FilterCondition::exists(key));
        self
    }

    pub fn not_exists(mut self, key: impl Into<String>) -> Self {
        self.filters.push(FilterCondition::not_exists(key));
        self
    }

    pub fn condition(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }

    /// Build the final filter, `None` when no condition was added
    pub fn build(self) -> Option<FilterExpression> {
        if self.filters.is_empty() {
            return None;
        }

        Some(FilterExpression::new(self.connector, self.filters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(key: &str, operator: FilterOperator, raw: &str) -> FilterRow {
        FilterRow::new(key, operator, raw)
    }

    #[test]
    fn test_empty_rows_collapse_to_none() {
        assert_eq!(parse_rows(&[]), None);
        assert_eq!(parse_rows(&[row("", FilterOperator::Eq, "x")]), None);
        assert_eq!(parse_rows(&[row("   ", FilterOperator::In, "a,b")]), None);
    }

    #[test]
    fn test_value_typing() {
        let filter = parse_rows(&[
            row("published", FilterOperator::Eq, "true"),
            row("archived", FilterOperator::Ne, "false"),
            row("owner", FilterOperator::Eq, "null"),
            row("version", FilterOperator::Gte, "3"),
            row("score", FilterOperator::Gt, "0.75"),
            row("title", FilterOperator::StartsWith, "Intro"),
            row("code", FilterOperator::Eq, ""),
        ])
        .unwrap();

        let values: Vec<Option<Value>> = filter.filters.iter().map(|c| c.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                Some(json!(true)),
                Some(json!(false)),
                Some(Value::Null),
                Some(json!(3)),
                Some(json!(0.75)),
                Some(json!("Intro")),
                Some(json!("")),
            ]
        );
    }

    #[test]
    fn test_whitespace_is_not_a_number() {
        assert_eq!(parse_simple_value("   "), json!("   "));
        assert_eq!(parse_simple_value(" 12 "), json!(12));
        assert_eq!(parse_simple_value("1e3"), json!(1000));
        assert_eq!(parse_simple_value("NaN"), json!("NaN"));
        assert_eq!(parse_simple_value("inf"), json!("inf"));
    }

    #[test]
    fn test_in_operator_comma_split() {
        let filter = parse_rows(&[row("tag", FilterOperator::In, "a, b, c")]).unwrap();
        assert_eq!(filter.filters[0].value, Some(json!(["a", "b", "c"])));
    }

    #[test]
    fn test_in_operator_json_array() {
        let filter = parse_rows(&[row("tag", FilterOperator::In, r#"["x","y"]"#)]).unwrap();
        assert_eq!(filter.filters[0].value, Some(json!(["x", "y"])));
    }

    #[test]
    fn test_in_operator_falls_back_on_bad_json() {
        let filter = parse_rows(&[row("n", FilterOperator::NotIn, "[1, 2")]).unwrap();
        assert_eq!(filter.filters[0].value, Some(json!(["[1", 2])));

        let filter = parse_rows(&[row("n", FilterOperator::In, "1, true, , x")]).unwrap();
        assert_eq!(filter.filters[0].value, Some(json!([1, true, "x"])));
    }

    #[test]
    fn test_exists_omits_value() {
        let filter = parse_rows(&[
            row("author", FilterOperator::Exists, "ignored"),
            row("draft", FilterOperator::NotExists, ""),
        ])
        .unwrap();

        assert!(filter.filters.iter().all(|c| c.value.is_none()));

        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            json,
            json!({
                "connector": "and",
                "filters": [
                    {"key": "author", "operator": "exists"},
                    {"key": "draft", "operator": "not_exists"}
                ]
            })
        );
    }

    #[test]
    fn test_parse_rows_with_connector() {
        let filter = parse_rows_with(
            FilterConnector::Or,
            &[row("status", FilterOperator::Eq, "active")],
        )
        .unwrap();

        assert_eq!(filter.connector, FilterConnector::Or);
    }

    #[test]
    fn test_rows_round_trip() {
        let rows = vec![
            row("category", FilterOperator::Eq, "manual"),
            row("", FilterOperator::Eq, "dropped"),
            row("version", FilterOperator::Lt, "10"),
            row("ratio", FilterOperator::Lte, "2.50"),
            row("tags", FilterOperator::In, "a, 2, false"),
            row("ids", FilterOperator::NotIn, r#"["1", 2, null]"#),
            row("owner", FilterOperator::Exists, ""),
            row("flag", FilterOperator::Eq, "true"),
            row("blank", FilterOperator::Contains, ""),
        ];

        let parsed = parse_rows(&rows).unwrap();
        let reparsed = parse_rows(&to_rows(&parsed)).unwrap();

        assert_eq!(parsed, reparsed);
        assert_eq!(parsed.len(), 8);
    }

    #[test]
    fn test_to_rows_renders_raw_text() {
        let filter = FilterBuilder::new()
            .eq("category", "docs")
            .gt("version", 1)
            .in_list("tag", vec![json!("a"), json!("b")])
            .exists("author")
            .build()
            .unwrap();

        let rows = to_rows(&filter);
        let raw: Vec<&str> = rows.iter().map(|r| r.raw_value.as_str()).collect();
        assert_eq!(raw, vec!["docs", "1", r#"["a","b"]"#, ""]);
    }

    #[test]
    fn test_filter_builder() {
        assert!(FilterBuilder::new().build().is_none());

        let filter = FilterBuilder::or()
            .eq("status", "active")
            .eq("status", "published")
            .build()
            .unwrap();

        assert_eq!(filter.connector, FilterConnector::Or);
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_from_json_group() {
        let filter = FilterExpression::from_json(&json!({
            "connector": "OR",
            "filters": [
                {"key": "category", "operator": "eq", "value": "docs"},
                {"key": "", "operator": "eq", "value": "x"},
                {"key": "author", "operator": "exists", "value": "ignored"}
            ]
        }))
        .unwrap()
        .unwrap();

        assert_eq!(filter.connector, FilterConnector::Or);
        assert_eq!(filter.len(), 2);
        assert_eq!(filter.filters[1], FilterCondition::exists("author"));
    }

    #[test]
    fn test_from_json_single_condition_and_empty() {
        let filter =
            FilterExpression::from_json(&json!({"key": "lang", "operator": "eq", "value": "en"}))
                .unwrap()
                .unwrap();
        assert_eq!(filter.connector, FilterConnector::And);
        assert_eq!(filter.filters[0].value, Some(json!("en")));

        assert_eq!(FilterExpression::from_json(&Value::Null).unwrap(), None);
        assert_eq!(
            FilterExpression::from_json(&json!({"filters": []})).unwrap(),
            None
        );
    }

    #[test]
    fn test_from_json_errors() {
        assert_eq!(
            FilterExpression::from_json(&json!({"filters": [{"key": "a", "operator": "like"}]})),
            Err(FilterError::UnknownOperator("like".to_string()))
        );
        assert!(matches!(
            FilterExpression::from_json(&json!("category = docs")),
            Err(FilterError::Malformed(_))
        ));
        assert!(matches!(
            FilterExpression::from_json(&json!({"connector": "xor", "filters": []})),
            Err(FilterError::UnknownConnector(_))
        ));
    }

    #[test]
    fn test_operator_names() {
        assert_eq!("starts_with".parse::<FilterOperator>().unwrap(), FilterOperator::StartsWith);
        assert_eq!(FilterOperator::Gte.to_string(), ">=");
        assert_eq!(FilterOperator::NotIn.to_string(), "not_in");
        assert!(!FilterOperator::Exists.takes_value());
        assert!(FilterOperator::NotIn.is_list());
    }
}
