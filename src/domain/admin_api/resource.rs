//! Resources exposed by the gateway admin API

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::domain::error::DomainError;

/// A resource collection under the admin API base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminResource {
    Configuration,
    Budgets,
    ExecutionLogs,
    Credentials,
    Workflows,
    Prompts,
    Webhooks,
    Teams,
    Experiments,
    Models,
    TestCases,
    KnowledgeBases,
    ExternalApis,
    ApiKeys,
}

impl AdminResource {
    pub const ALL: [AdminResource; 14] = [
        Self::Configuration,
        Self::Budgets,
        Self::ExecutionLogs,
        Self::Credentials,
        Self::Workflows,
        Self::Prompts,
        Self::Webhooks,
        Self::Teams,
        Self::Experiments,
        Self::Models,
        Self::TestCases,
        Self::KnowledgeBases,
        Self::ExternalApis,
        Self::ApiKeys,
    ];

    /// Name used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "config",
            Self::Budgets => "budgets",
            Self::ExecutionLogs => "execution-logs",
            Self::Credentials => "credentials",
            Self::Workflows => "workflows",
            Self::Prompts => "prompts",
            Self::Webhooks => "webhooks",
            Self::Teams => "teams",
            Self::Experiments => "experiments",
            Self::Models => "models",
            Self::TestCases => "test-cases",
            Self::KnowledgeBases => "knowledge-bases",
            Self::ExternalApis => "external-apis",
            Self::ApiKeys => "api-keys",
        }
    }

    /// Key of the array in list responses, e.g. `{"workflows": [...], "total": 1}`
    pub fn list_key(&self) -> &'static str {
        match self {
            Self::Configuration => "config",
            Self::Budgets => "budgets",
            Self::ExecutionLogs => "logs",
            Self::Credentials => "credentials",
            Self::Workflows => "workflows",
            Self::Prompts => "prompts",
            Self::Webhooks => "webhooks",
            Self::Teams => "teams",
            Self::Experiments => "experiments",
            Self::Models => "models",
            Self::TestCases => "test_cases",
            Self::KnowledgeBases => "knowledge_bases",
            Self::ExternalApis => "external_apis",
            Self::ApiKeys => "api_keys",
        }
    }
}

impl FromStr for AdminResource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");

        if normalized == "configuration" {
            return Ok(Self::Configuration);
        }

        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|r| r.as_str()).collect();
                DomainError::configuration(format!(
                    "Unknown resource '{}': expected one of {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

impl fmt::Display for AdminResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Items of a list response
///
/// Accepts a bare array, the `{<key>: [...], total}` envelope, or any object with a
/// single array field. Other objects are treated as a one-item list.
pub fn extract_list(body: Value, key: &str) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            if let Some(Value::Array(items)) = obj.remove(key) {
                return items;
            }

            let arrays: Vec<&String> = obj
                .iter()
                .filter(|(_, v)| v.is_array())
                .map(|(k, _)| k)
                .collect();

            if arrays.len() == 1 {
                let only = arrays[0].clone();
                if let Some(Value::Array(items)) = obj.remove(&only) {
                    return items;
                }
            }

            if obj.is_empty() {
                Vec::new()
            } else {
                vec![Value::Object(obj)]
            }
        }
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_names() {
        assert_eq!(
            "knowledge_bases".parse::<AdminResource>().unwrap(),
            AdminResource::KnowledgeBases
        );
        assert_eq!(
            "Configuration".parse::<AdminResource>().unwrap(),
            AdminResource::Configuration
        );
        assert!("gizmos".parse::<AdminResource>().is_err());
    }

    #[test]
    fn test_extract_list_envelope() {
        let items = extract_list(json!({"workflows": [{"id": "a"}], "total": 1}), "workflows");
        assert_eq!(items, vec![json!({"id": "a"})]);

        let items = extract_list(json!({"operations": [{"id": "op"}], "total": 1}), "logs");
        assert_eq!(items, vec![json!({"id": "op"})]);

        let items = extract_list(json!([1, 2]), "anything");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_extract_list_single_object() {
        let items = extract_list(json!({"default_model": "gpt-4"}), "config");
        assert_eq!(items, vec![json!({"default_model": "gpt-4"})]);
        assert!(extract_list(Value::Null, "config").is_empty());
    }
}
