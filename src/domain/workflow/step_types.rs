//! Workflow step type definitions

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::WorkflowError;
use crate::domain::knowledge_base::FilterExpression;

/// Type of workflow step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowStepType {
    /// LLM chat completion step
    ChatCompletion(ChatCompletionStep),

    /// Knowledge base search step
    KnowledgeBaseSearch(KnowledgeBaseSearchStep),

    /// CRAG document scoring step
    CragScoring(CragScoringStep),

    /// Conditional branching step
    Conditional(ConditionalStep),

    /// HTTP request step
    HttpRequest(HttpRequestStep),
}

impl WorkflowStepType {
    /// Get a human-readable type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ChatCompletion(_) => "chat_completion",
            Self::KnowledgeBaseSearch(_) => "knowledge_base_search",
            Self::CragScoring(_) => "crag_scoring",
            Self::Conditional(_) => "conditional",
            Self::HttpRequest(_) => "http_request",
        }
    }

    /// Template strings carried by this step, paired with the field they come from
    pub fn template_fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::ChatCompletion(step) => {
                let mut fields = vec![("user_message", step.user_message.as_str())];
                fields.extend(
                    step.prompt_variables
                        .values()
                        .map(|v| ("prompt_variables", v.as_str())),
                );
                fields
            }
            Self::KnowledgeBaseSearch(step) => vec![("query", step.query.as_str())],
            Self::CragScoring(step) => {
                let mut fields = vec![
                    ("documents_source", step.documents_source.as_str()),
                    ("query", step.query.as_str()),
                ];
                fields.extend(
                    step.prompt_variables
                        .values()
                        .map(|v| ("prompt_variables", v.as_str())),
                );
                fields
            }
            Self::Conditional(step) => step
                .conditions
                .iter()
                .map(|c| ("conditions", c.field.as_str()))
                .collect(),
            Self::HttpRequest(step) => {
                let mut fields = vec![("path", step.path.as_str())];
                fields.extend(step.headers.values().map(|v| ("headers", v.as_str())));
                fields
            }
        }
    }
}

/// Chat completion step configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionStep {
    /// Model ID to use for completion
    pub model_id: String,

    /// Prompt ID to use as system message template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,

    /// User message template (can contain variable references)
    pub user_message: String,

    /// Prompt template variables (key -> value, values can contain variable references)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prompt_variables: BTreeMap<String, String>,

    /// Optional temperature override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Optional max tokens override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Optional top_p override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl ChatCompletionStep {
    pub fn new(model_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt_id: None,
            user_message: user_message.into(),
            prompt_variables: BTreeMap::new(),
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    pub fn with_prompt(mut self, prompt_id: impl Into<String>) -> Self {
        self.prompt_id = Some(prompt_id.into());
        self
    }

    pub fn with_prompt_variable(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.prompt_variables.insert(key.into(), value.into());
        self
    }

    pub fn with_prompt_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.prompt_variables = variables;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Knowledge base search step configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBaseSearchStep {
    /// Knowledge base ID to search
    pub knowledge_base_id: String,

    /// Search query (can contain variable references)
    pub query: String,

    /// Number of results to return
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Optional minimum similarity score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,

    /// Optional metadata filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterExpression>,
}

pub(crate) fn default_top_k() -> u32 {
    5
}

impl KnowledgeBaseSearchStep {
    pub fn new(knowledge_base_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            knowledge_base_id: knowledge_base_id.into(),
            query: query.into(),
            top_k: default_top_k(),
            min_score: None,
            filter: None,
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// CRAG scoring step configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CragScoringStep {
    /// Model ID to use for LLM-based scoring
    pub model_id: String,

    /// Prompt ID for the scoring instructions
    pub prompt_id: String,

    /// Reference to the documents to score, usually `${step:<search>:documents}`
    pub documents_source: String,

    /// Query the documents are scored against (can contain variable references)
    pub query: String,

    /// Relevance threshold (0.0 - 1.0)
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Prompt variables to pass to the scoring prompt
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prompt_variables: BTreeMap<String, String>,
}

pub(crate) fn default_threshold() -> f64 {
    0.5
}

impl CragScoringStep {
    pub fn new(
        model_id: impl Into<String>,
        prompt_id: impl Into<String>,
        documents_source: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            prompt_id: prompt_id.into(),
            documents_source: documents_source.into(),
            query: query.into(),
            threshold: default_threshold(),
            prompt_variables: BTreeMap::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_prompt_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.prompt_variables = variables;
        self
    }
}

/// Conditional branching step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionalStep {
    /// Conditions to evaluate (in order, first match wins)
    pub conditions: Vec<Condition>,

    /// Action taken when no condition matches
    #[serde(default)]
    pub default_action: DefaultAction,
}

impl ConditionalStep {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            default_action: DefaultAction::Continue,
        }
    }

    pub fn with_default_action(mut self, action: DefaultAction) -> Self {
        self.default_action = action;
        self
    }

    pub fn add_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// Fallback action of a conditional step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    #[default]
    Continue,
    SkipStep,
}

impl FromStr for DefaultAction {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(Self::Continue),
            "skip_step" => Ok(Self::SkipStep),
            other => Err(WorkflowError::validation(format!(
                "Invalid default action '{}': expected continue or skip_step",
                other
            ))),
        }
    }
}

/// A single condition of a conditional step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Field to evaluate (variable reference like ${step:search:total})
    pub field: String,

    /// Comparison operator
    pub operator: ConditionOperator,

    /// Value to compare against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Action to take if the condition holds
    pub action: ConditionalAction,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        action: ConditionalAction,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: None,
            action,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Condition comparison operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
}

impl ConditionOperator {
    /// Whether the operator compares against a value
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals => write!(f, "=="),
            Self::NotEquals => write!(f, "!="),
            Self::Contains => write!(f, "contains"),
            Self::IsEmpty => write!(f, "is empty"),
            Self::IsNotEmpty => write!(f, "is not empty"),
            Self::GreaterThan => write!(f, ">"),
            Self::LessThan => write!(f, "<"),
        }
    }
}

/// Output of an `end_workflow` action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EndWorkflowOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Action to take when a condition matches
///
/// Wire forms: `"continue"`, `{"go_to_step": "name"}`,
/// `{"end_workflow": {"error": ..} | {"result": ..}}`, `{"skip_step": true}`.
/// Any other JSON is kept verbatim as `Unrecognized`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(from = "Value", into = "Value")]
pub enum ConditionalAction {
    #[default]
    Continue,
    GoToStep(String),
    EndWorkflow(EndWorkflowOutput),
    SkipStep,
    Unrecognized(Value),
}

impl ConditionalAction {
    pub fn go_to_step(name: impl Into<String>) -> Self {
        Self::GoToStep(name.into())
    }

    pub fn end_with_error(message: impl Into<String>) -> Self {
        Self::EndWorkflow(EndWorkflowOutput {
            error: Some(message.into()),
            result: None,
        })
    }

    pub fn end_with_result(result: Value) -> Self {
        Self::EndWorkflow(EndWorkflowOutput {
            error: None,
            result: Some(result),
        })
    }
}

impl From<Value> for ConditionalAction {
    fn from(value: Value) -> Self {
        match &value {
            Value::String(s) if s == "continue" => return Self::Continue,
            Value::Object(obj) if obj.len() == 1 => {
                if let Some(Value::String(target)) = obj.get("go_to_step") {
                    return Self::GoToStep(target.clone());
                }

                if let Some(Value::Bool(true)) = obj.get("skip_step") {
                    return Self::SkipStep;
                }

                if let Some(output) = obj.get("end_workflow") {
                    if output.is_null() {
                        return Self::EndWorkflow(EndWorkflowOutput::default());
                    }

                    if let Ok(parsed) = serde_json::from_value::<EndWorkflowOutput>(output.clone())
                    {
                        return Self::EndWorkflow(parsed);
                    }
                }
            }
            _ => {}
        }

        Self::Unrecognized(value)
    }
}

impl From<ConditionalAction> for Value {
    fn from(action: ConditionalAction) -> Self {
        match action {
            ConditionalAction::Continue => Value::String("continue".to_string()),
            ConditionalAction::GoToStep(target) => {
                single_key("go_to_step", Value::String(target))
            }
            ConditionalAction::EndWorkflow(output) => single_key(
                "end_workflow",
                serde_json::to_value(output).unwrap_or(Value::Object(Map::new())),
            ),
            ConditionalAction::SkipStep => single_key("skip_step", Value::Bool(true)),
            ConditionalAction::Unrecognized(raw) => raw,
        }
    }
}

fn single_key(key: &str, value: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(key.to_string(), value);
    Value::Object(obj)
}

/// HTTP request method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            other => Err(WorkflowError::validation(format!(
                "Unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request step configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpRequestStep {
    /// External API ID providing the base URL and base headers
    pub external_api_id: String,

    /// Credential ID for authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,

    /// URI path appended to the external API's base URL (can contain variable references)
    #[serde(default = "default_path")]
    pub path: String,

    /// HTTP method
    #[serde(default)]
    pub method: HttpMethod,

    /// Timeout in milliseconds
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,

    /// Additional request headers, merged with the external API's base headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Request body template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// JSON path to extract from the response (e.g. "$.data.result")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_path: Option<String>,

    /// Whether to fail on non-2xx status codes
    #[serde(default = "default_true")]
    pub fail_on_error: bool,
}

pub(crate) fn default_path() -> String {
    "/".to_string()
}

pub(crate) fn default_http_timeout() -> u64 {
    30000
}

fn default_true() -> bool {
    true
}

impl HttpRequestStep {
    pub fn new(external_api_id: impl Into<String>) -> Self {
        Self {
            external_api_id: external_api_id.into(),
            credential_id: None,
            path: default_path(),
            method: HttpMethod::Get,
            timeout_ms: default_http_timeout(),
            headers: BTreeMap::new(),
            body: None,
            extract_path: None,
            fail_on_error: true,
        }
    }

    pub fn with_credential(mut self, credential_id: impl Into<String>) -> Self {
        self.credential_id = Some(credential_id.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }

    pub fn with_extract_path(mut self, path: impl Into<String>) -> Self {
        self.extract_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_completion_step_builder() {
        let step = ChatCompletionStep::new("gpt-4", "${request:question}")
            .with_prompt("helpful-assistant")
            .with_prompt_variable("tone", "friendly")
            .with_temperature(0.7)
            .with_max_tokens(1000);

        assert_eq!(step.model_id, "gpt-4");
        assert_eq!(step.prompt_id.as_deref(), Some("helpful-assistant"));
        assert_eq!(step.user_message, "${request:question}");
        assert_eq!(
            step.prompt_variables.get("tone"),
            Some(&"friendly".to_string())
        );
        assert_eq!(step.temperature, Some(0.7));
        assert_eq!(step.max_tokens, Some(1000));
    }

    #[test]
    fn test_kb_search_defaults() {
        let step: KnowledgeBaseSearchStep =
            serde_json::from_value(json!({"knowledge_base_id": "docs", "query": "q"})).unwrap();

        assert_eq!(step.top_k, 5);
        assert!(step.min_score.is_none());
        assert!(step.filter.is_none());
    }

    #[test]
    fn test_crag_defaults() {
        let step: CragScoringStep = serde_json::from_value(json!({
            "model_id": "gpt-4o",
            "prompt_id": "crag-scorer",
            "documents_source": "${step:search:documents}",
            "query": "${request:question}"
        }))
        .unwrap();

        assert_eq!(step.threshold, 0.5);
        assert!(step.prompt_variables.is_empty());
    }

    #[test]
    fn test_http_request_defaults() {
        let step: HttpRequestStep =
            serde_json::from_value(json!({"external_api_id": "weather"})).unwrap();

        assert_eq!(step.path, "/");
        assert_eq!(step.method, HttpMethod::Get);
        assert_eq!(step.timeout_ms, 30000);
        assert!(step.fail_on_error);
        assert!(step.headers.is_empty());
    }

    #[test]
    fn test_http_method_parsing() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(" PATCH ".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert_eq!(
            serde_json::to_value(HttpMethod::Delete).unwrap(),
            json!("DELETE")
        );
    }

    #[test]
    fn test_workflow_step_type_serialization() {
        let step = WorkflowStepType::ChatCompletion(ChatCompletionStep::new("gpt-4", "Hello"));

        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("\"type\":\"chat_completion\""));
        assert!(json.contains("\"model_id\":\"gpt-4\""));
        assert!(!json.contains("prompt_variables"));
        assert!(!json.contains("temperature"));

        let deserialized: WorkflowStepType = serde_json::from_str(&json).unwrap();
        assert_eq!(step, deserialized);
    }

    #[test]
    fn test_conditional_action_wire_forms() {
        assert_eq!(
            serde_json::to_value(ConditionalAction::Continue).unwrap(),
            json!("continue")
        );
        assert_eq!(
            serde_json::to_value(ConditionalAction::go_to_step("fallback")).unwrap(),
            json!({"go_to_step": "fallback"})
        );
        assert_eq!(
            serde_json::to_value(ConditionalAction::end_with_error("No results")).unwrap(),
            json!({"end_workflow": {"error": "No results"}})
        );
        assert_eq!(
            serde_json::to_value(ConditionalAction::SkipStep).unwrap(),
            json!({"skip_step": true})
        );
    }

    #[test]
    fn test_conditional_action_parsing() {
        let action: ConditionalAction = serde_json::from_value(json!("continue")).unwrap();
        assert_eq!(action, ConditionalAction::Continue);

        let action: ConditionalAction =
            serde_json::from_value(json!({"go_to_step": "answer"})).unwrap();
        assert_eq!(action, ConditionalAction::go_to_step("answer"));

        let action: ConditionalAction =
            serde_json::from_value(json!({"end_workflow": {"result": {"answer": 42}}})).unwrap();
        assert_eq!(
            action,
            ConditionalAction::end_with_result(json!({"answer": 42}))
        );

        let action: ConditionalAction =
            serde_json::from_value(json!({"skip_step": true})).unwrap();
        assert_eq!(action, ConditionalAction::SkipStep);
    }

    #[test]
    fn test_unrecognized_action_is_preserved() {
        let raw = json!({"retry": {"times": 3}});
        let action: ConditionalAction = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(action, ConditionalAction::Unrecognized(raw.clone()));
        assert_eq!(serde_json::to_value(action).unwrap(), raw);

        let action: ConditionalAction =
            serde_json::from_value(json!({"skip_step": false})).unwrap();
        assert!(matches!(action, ConditionalAction::Unrecognized(_)));
    }

    #[test]
    fn test_condition_value_omitted_when_absent() {
        let condition = Condition::new(
            "${step:search:documents}",
            ConditionOperator::IsEmpty,
            ConditionalAction::end_with_error("Nothing found"),
        );

        let json = serde_json::to_value(&condition).unwrap();
        assert!(json.get("value").is_none());
        assert_eq!(json["operator"], json!("is_empty"));
        assert!(!condition.operator.takes_value());
    }

    #[test]
    fn test_default_action_parsing() {
        assert_eq!(
            "skip_step".parse::<DefaultAction>().unwrap(),
            DefaultAction::SkipStep
        );
        assert!("go_to_step".parse::<DefaultAction>().is_err());
    }

    #[test]
    fn test_template_fields() {
        let step = WorkflowStepType::HttpRequest(
            HttpRequestStep::new("crm")
                .with_path("/users/${request:user_id}")
                .with_header("X-Trace", "${step:start:content}"),
        );

        let fields = step.template_fields();
        assert!(fields.contains(&("path", "/users/${request:user_id}")));
        assert!(fields.contains(&("headers", "${step:start:content}")));
    }
}
