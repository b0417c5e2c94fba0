//! Step definition registry
//!
//! Knows the five step types, which form fields each one requires, which outputs
//! each one exposes to later steps, and how raw form input becomes a typed step.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{OnErrorAction, WorkflowStep};
use super::error::WorkflowError;
use super::references::extract_prompt_variables;
use super::step_types::{
    default_http_timeout, default_path, default_threshold, default_top_k, ChatCompletionStep,
    Condition, ConditionalStep, CragScoringStep, DefaultAction, HttpMethod, HttpRequestStep,
    KnowledgeBaseSearchStep, WorkflowStepType,
};
use crate::domain::knowledge_base::{parse_rows_with, to_rows, FilterConnector, FilterRow};

/// Leading float literal, as accepted by a lenient `parseFloat`
static FLOAT_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*(?:[eE][+-]?\d+)?|\.\d+(?:[eE][+-]?\d+)?)").unwrap()
});

/// Leading integer literal, as accepted by a lenient `parseInt`
static INT_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+").unwrap());

/// Step type tag without its configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ChatCompletion,
    KnowledgeBaseSearch,
    CragScoring,
    Conditional,
    HttpRequest,
}

/// An output a step exposes to the steps after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputVariable {
    pub name: &'static str,
    pub description: &'static str,
}

const fn output(name: &'static str, description: &'static str) -> OutputVariable {
    OutputVariable { name, description }
}

const CHAT_COMPLETION_OUTPUTS: &[OutputVariable] = &[
    output("content", "Generated response text"),
    output("model", "Model that produced the response"),
    output("finish_reason", "Why generation stopped"),
];

const KNOWLEDGE_BASE_SEARCH_OUTPUTS: &[OutputVariable] = &[
    output("documents", "Matching documents"),
    output("documents_xml", "Matching documents formatted as XML for prompts"),
    output("total", "Number of documents found"),
];

const CRAG_SCORING_OUTPUTS: &[OutputVariable] = &[
    output("scored_documents", "Documents that passed the relevance threshold"),
    output("relevant_count", "Number of relevant documents"),
];

const CONDITIONAL_OUTPUTS: &[OutputVariable] =
    &[output("action", "Action chosen by the matching condition")];

const HTTP_REQUEST_OUTPUTS: &[OutputVariable] = &[
    output("body", "Parsed response body"),
    output("extracted", "Value found at extract_path"),
    output("status_code", "HTTP status code"),
];

impl StepKind {
    pub const ALL: [StepKind; 5] = [
        Self::ChatCompletion,
        Self::KnowledgeBaseSearch,
        Self::CragScoring,
        Self::Conditional,
        Self::HttpRequest,
    ];

    pub fn of(step_type: &WorkflowStepType) -> Self {
        match step_type {
            WorkflowStepType::ChatCompletion(_) => Self::ChatCompletion,
            WorkflowStepType::KnowledgeBaseSearch(_) => Self::KnowledgeBaseSearch,
            WorkflowStepType::CragScoring(_) => Self::CragScoring,
            WorkflowStepType::Conditional(_) => Self::Conditional,
            WorkflowStepType::HttpRequest(_) => Self::HttpRequest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatCompletion => "chat_completion",
            Self::KnowledgeBaseSearch => "knowledge_base_search",
            Self::CragScoring => "crag_scoring",
            Self::Conditional => "conditional",
            Self::HttpRequest => "http_request",
        }
    }

    /// Form fields that must be non-blank to build this step
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::ChatCompletion => &["name", "model_id", "user_message"],
            Self::KnowledgeBaseSearch => &["name", "knowledge_base_id", "query"],
            Self::CragScoring => &["name", "model_id", "prompt_id", "documents_source", "query"],
            Self::Conditional => &["name", "conditions"],
            Self::HttpRequest => &["name", "external_api_id"],
        }
    }

    /// Outputs later steps can reference through `${step:<name>:<output>}`
    pub fn output_variables(&self) -> &'static [OutputVariable] {
        match self {
            Self::ChatCompletion => CHAT_COMPLETION_OUTPUTS,
            Self::KnowledgeBaseSearch => KNOWLEDGE_BASE_SEARCH_OUTPUTS,
            Self::CragScoring => CRAG_SCORING_OUTPUTS,
            Self::Conditional => CONDITIONAL_OUTPUTS,
            Self::HttpRequest => HTTP_REQUEST_OUTPUTS,
        }
    }

    /// Whether the step collects prompt template variables
    pub fn uses_prompt_variables(&self) -> bool {
        matches!(self, Self::ChatCompletion | Self::CragScoring)
    }
}

impl FromStr for StepKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| WorkflowError::unknown_step_type(s))
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw input of the step editor form
#[derive(Debug, Clone, Default)]
pub struct StepForm {
    fields: HashMap<String, String>,
    prompt_content: Option<String>,
    prompt_variable_inputs: BTreeMap<String, String>,
    filter_connector: FilterConnector,
    filter_rows: Vec<FilterRow>,
}

impl StepForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Content of the selected prompt, scanned for `${var:..}` tokens
    pub fn with_prompt_content(mut self, content: impl Into<String>) -> Self {
        self.prompt_content = Some(content.into());
        self
    }

    pub fn with_prompt_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.prompt_variable_inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_filter_connector(mut self, connector: FilterConnector) -> Self {
        self.filter_connector = connector;
        self
    }

    pub fn with_filter_row(mut self, row: FilterRow) -> Self {
        self.filter_rows.push(row);
        self
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Raw field value as typed
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Field value, `None` when absent or blank
    fn non_blank(&self, key: &str) -> Option<&str> {
        self.field(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn filter_rows(&self) -> &[FilterRow] {
        &self.filter_rows
    }

    /// Populate a form from an existing step so it can be edited
    pub fn from_step(step: &WorkflowStep) -> Self {
        let mut form = Self::new()
            .with_field("name", step.name())
            .with_field("on_error", step.on_error().as_str());

        match step.step_type() {
            WorkflowStepType::ChatCompletion(chat) => {
                form.set_field("model_id", chat.model_id.as_str());
                form.set_field("prompt_id", chat.prompt_id.clone().unwrap_or_default());
                form.set_field("user_message", chat.user_message.as_str());
                set_optional(&mut form, "temperature", chat.temperature);
                set_optional(&mut form, "max_tokens", chat.max_tokens);
                set_optional(&mut form, "top_p", chat.top_p);
                form.prompt_variable_inputs = chat.prompt_variables.clone();
            }
            WorkflowStepType::KnowledgeBaseSearch(kb) => {
                form.set_field("knowledge_base_id", kb.knowledge_base_id.as_str());
                form.set_field("query", kb.query.as_str());
                form.set_field("top_k", kb.top_k.to_string());
                set_optional(&mut form, "min_score", kb.min_score);

                if let Some(filter) = &kb.filter {
                    form.filter_connector = filter.connector;
                    form.filter_rows = to_rows(filter);
                }
            }
            WorkflowStepType::CragScoring(crag) => {
                form.set_field("model_id", crag.model_id.as_str());
                form.set_field("prompt_id", crag.prompt_id.as_str());
                form.set_field("documents_source", crag.documents_source.as_str());
                form.set_field("query", crag.query.as_str());
                form.set_field("threshold", crag.threshold.to_string());
                form.prompt_variable_inputs = crag.prompt_variables.clone();
            }
            WorkflowStepType::Conditional(cond) => {
                let conditions =
                    serde_json::to_string_pretty(&cond.conditions).unwrap_or_default();
                form.set_field("conditions", conditions);
                form.set_field(
                    "default_action",
                    match cond.default_action {
                        DefaultAction::Continue => "continue",
                        DefaultAction::SkipStep => "skip_step",
                    },
                );
            }
            WorkflowStepType::HttpRequest(http) => {
                form.set_field("external_api_id", http.external_api_id.as_str());
                form.set_field(
                    "credential_id",
                    http.credential_id.clone().unwrap_or_default(),
                );
                form.set_field("path", http.path.as_str());
                form.set_field("method", http.method.as_str());
                form.set_field("timeout_ms", http.timeout_ms.to_string());
                form.set_field("fail_on_error", http.fail_on_error.to_string());
                form.set_field("extract_path", http.extract_path.clone().unwrap_or_default());

                if !http.headers.is_empty() {
                    let headers = serde_json::to_string_pretty(&http.headers).unwrap_or_default();
                    form.set_field("headers", headers);
                }

                if let Some(body) = &http.body {
                    form.set_field("body", serde_json::to_string_pretty(body).unwrap_or_default());
                }
            }
        }

        form
    }
}

fn set_optional<T: ToString>(form: &mut StepForm, key: &str, value: Option<T>) {
    if let Some(v) = value {
        form.set_field(key, v.to_string());
    }
}

/// Leading float of `raw`, `None` when blank, unparsable or non-finite
pub fn parse_float(raw: &str) -> Option<f64> {
    let text = raw.trim_start();
    let literal = FLOAT_PREFIX.find(text)?.as_str();
    literal.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Leading integer of `raw`, `None` when blank or unparsable
pub fn parse_int(raw: &str) -> Option<i64> {
    let text = raw.trim_start();
    INT_PREFIX.find(text)?.as_str().parse::<i64>().ok()
}

fn parse_u32(raw: Option<&str>) -> Option<u32> {
    raw.and_then(parse_int).and_then(|v| u32::try_from(v).ok())
}

fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) => !matches!(v.as_str(), "false" | "off" | "0" | "no"),
    }
}

/// Build a typed step from raw form input
///
/// Optional fields are left out when blank or unparsable, so the persisted document
/// never carries placeholders.
pub fn build_step(kind: StepKind, form: &StepForm) -> Result<WorkflowStep, WorkflowError> {
    for field in kind.required_fields() {
        if form.non_blank(field).is_none() {
            return Err(WorkflowError::missing_field(kind.as_str(), *field));
        }
    }

    let name = form.non_blank("name").unwrap_or_default().to_string();
    let required = |key: &str| form.non_blank(key).unwrap_or_default().to_string();

    let step_type = match kind {
        StepKind::ChatCompletion => {
            let mut step = ChatCompletionStep::new(
                required("model_id"),
                form.field("user_message").unwrap_or_default(),
            )
            .with_prompt_variables(collect_prompt_variables(form));

            if let Some(prompt_id) = form.non_blank("prompt_id") {
                step = step.with_prompt(prompt_id);
            }

            step.temperature = form.field("temperature").and_then(parse_float);
            step.max_tokens = parse_u32(form.field("max_tokens"));
            step.top_p = form.field("top_p").and_then(parse_float);

            WorkflowStepType::ChatCompletion(step)
        }
        StepKind::KnowledgeBaseSearch => {
            let mut step = KnowledgeBaseSearchStep::new(
                required("knowledge_base_id"),
                form.field("query").unwrap_or_default(),
            )
            .with_top_k(parse_u32(form.field("top_k")).unwrap_or_else(default_top_k));

            step.min_score = form.field("min_score").and_then(parse_float);
            step.filter = parse_rows_with(form.filter_connector, &form.filter_rows);

            WorkflowStepType::KnowledgeBaseSearch(step)
        }
        StepKind::CragScoring => {
            let step = CragScoringStep::new(
                required("model_id"),
                required("prompt_id"),
                required("documents_source"),
                form.field("query").unwrap_or_default(),
            )
            .with_threshold(
                form.field("threshold")
                    .and_then(parse_float)
                    .unwrap_or_else(default_threshold),
            )
            .with_prompt_variables(collect_prompt_variables(form));

            WorkflowStepType::CragScoring(step)
        }
        StepKind::Conditional => {
            let raw = form.field("conditions").unwrap_or_default();
            let conditions: Vec<Condition> = serde_json::from_str(raw)
                .map_err(|e| WorkflowError::invalid_json("conditions", e.to_string()))?;

            if conditions.is_empty() {
                return Err(WorkflowError::missing_field(kind.as_str(), "conditions"));
            }

            let default_action = match form.non_blank("default_action") {
                Some(action) => action.parse()?,
                None => DefaultAction::default(),
            };

            WorkflowStepType::Conditional(
                ConditionalStep::new(conditions).with_default_action(default_action),
            )
        }
        StepKind::HttpRequest => {
            let mut step = HttpRequestStep::new(required("external_api_id"))
                .with_path(
                    form.non_blank("path")
                        .map(str::to_string)
                        .unwrap_or_else(default_path),
                )
                .with_timeout_ms(
                    form.field("timeout_ms")
                        .and_then(parse_int)
                        .and_then(|v| u64::try_from(v).ok())
                        .unwrap_or_else(default_http_timeout),
                )
                .with_fail_on_error(parse_flag(form.field("fail_on_error"), true));

            if let Some(method) = form.non_blank("method") {
                step = step.with_method(method.parse::<HttpMethod>()?);
            }

            if let Some(credential_id) = form.non_blank("credential_id") {
                step = step.with_credential(credential_id);
            }

            if let Some(extract_path) = form.non_blank("extract_path") {
                step = step.with_extract_path(extract_path);
            }

            if let Some(headers) = parse_headers(form.field("headers"))? {
                step = step.with_headers(headers);
            }

            if let Some(body) = parse_json_field("body", form.field("body"))? {
                step = step.with_body(body);
            }

            WorkflowStepType::HttpRequest(step)
        }
    };

    let on_error = match form.non_blank("on_error") {
        Some(value) => value.parse::<OnErrorAction>()?,
        None => OnErrorAction::default(),
    };

    Ok(WorkflowStep::new(name, step_type).with_on_error(on_error))
}

/// Non-blank prompt variable values
///
/// With known prompt content only the variables the prompt declares are kept. Without it,
/// as when an existing step is reopened, every non-blank value is kept as stored.
fn collect_prompt_variables(form: &StepForm) -> BTreeMap<String, String> {
    let value_of = |name: &str| {
        form.prompt_variable_inputs
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    match form.prompt_content.as_deref() {
        Some(content) => extract_prompt_variables(content)
            .into_iter()
            .filter_map(|var| value_of(&var.name).map(|value| (var.name, value)))
            .collect(),
        None => form
            .prompt_variable_inputs
            .keys()
            .filter_map(|name| value_of(name).map(|value| (name.clone(), value)))
            .collect(),
    }
}

/// Parse a JSON textarea; blank text and `{}` mean "not set"
fn parse_json_field(field: &str, raw: Option<&str>) -> Result<Option<Value>, WorkflowError> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    let value: Value =
        serde_json::from_str(text).map_err(|e| WorkflowError::invalid_json(field, e.to_string()))?;

    match &value {
        Value::Object(obj) if obj.is_empty() => Ok(None),
        _ => Ok(Some(value)),
    }
}

fn parse_headers(raw: Option<&str>) -> Result<Option<BTreeMap<String, String>>, WorkflowError> {
    let Some(value) = parse_json_field("headers", raw)? else {
        return Ok(None);
    };

    let Value::Object(obj) = value else {
        return Err(WorkflowError::invalid_json(
            "headers",
            "expected a JSON object of header names to values",
        ));
    };

    Ok(Some(
        obj.into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect(),
    ))
}

/// Insert a new step or replace the one being edited
///
/// Returns the index the step ended up at. Fails with `DuplicateName` when a step at
/// another index already uses the name.
pub fn add_or_update_step(
    steps: &mut Vec<WorkflowStep>,
    step: WorkflowStep,
    editing_index: Option<usize>,
) -> Result<usize, WorkflowError> {
    let clash = steps
        .iter()
        .enumerate()
        .any(|(i, existing)| existing.name() == step.name() && Some(i) != editing_index);

    if clash {
        return Err(WorkflowError::duplicate_name(step.name()));
    }

    match editing_index {
        Some(index) => {
            let slot = steps
                .get_mut(index)
                .ok_or(WorkflowError::StepIndexOutOfRange(index))?;
            *slot = step;
            Ok(index)
        }
        None => {
            steps.push(step);
            Ok(steps.len() - 1)
        }
    }
}

/// Remove the step at `index`
pub fn remove_step(
    steps: &mut Vec<WorkflowStep>,
    index: usize,
) -> Result<WorkflowStep, WorkflowError> {
    if index >= steps.len() {
        return Err(WorkflowError::StepIndexOutOfRange(index));
    }

    Ok(steps.remove(index))
}

/// Move the step at `from` so it ends up at `to`
pub fn move_step(steps: &mut [WorkflowStep], from: usize, to: usize) -> Result<(), WorkflowError> {
    let len = steps.len();

    if from >= len {
        return Err(WorkflowError::StepIndexOutOfRange(from));
    }

    if to >= len {
        return Err(WorkflowError::StepIndexOutOfRange(to));
    }

    if from < to {
        steps[from..=to].rotate_left(1);
    } else {
        steps[to..=from].rotate_right(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge_base::{FilterOperator, FilterRow};
    use crate::domain::workflow::step_types::{ConditionOperator, ConditionalAction};
    use serde_json::json;

    fn chat_form(name: &str) -> StepForm {
        StepForm::new()
            .with_field("name", name)
            .with_field("model_id", "gpt-4")
            .with_field("user_message", "${request:question}")
    }

    fn built(kind: StepKind, form: &StepForm) -> Value {
        serde_json::to_value(build_step(kind, form).unwrap()).unwrap()
    }

    #[test]
    fn test_step_kind_parsing() {
        assert_eq!(
            "knowledge_base_search".parse::<StepKind>().unwrap(),
            StepKind::KnowledgeBaseSearch
        );
        assert!("loop".parse::<StepKind>().is_err());
        assert_eq!(StepKind::HttpRequest.to_string(), "http_request");
    }

    #[test]
    fn test_output_variables_catalog() {
        let names = |kind: StepKind| -> Vec<&str> {
            kind.output_variables().iter().map(|o| o.name).collect()
        };

        assert_eq!(
            names(StepKind::ChatCompletion),
            vec!["content", "model", "finish_reason"]
        );
        assert_eq!(
            names(StepKind::KnowledgeBaseSearch),
            vec!["documents", "documents_xml", "total"]
        );
        assert_eq!(
            names(StepKind::CragScoring),
            vec!["scored_documents", "relevant_count"]
        );
        assert_eq!(
            names(StepKind::HttpRequest),
            vec!["body", "extracted", "status_code"]
        );
        assert_eq!(names(StepKind::Conditional), vec!["action"]);
    }

    #[test]
    fn test_required_fields_enforced() {
        let form = StepForm::new()
            .with_field("name", "chat")
            .with_field("model_id", "  ")
            .with_field("user_message", "Hi");

        let err = build_step(StepKind::ChatCompletion, &form).unwrap_err();
        assert_eq!(err, WorkflowError::missing_field("chat_completion", "model_id"));
    }

    #[test]
    fn test_blank_temperature_is_omitted() {
        let form = chat_form("chat").with_field("temperature", "");
        let json = built(StepKind::ChatCompletion, &form);

        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("top_p").is_none());
        assert!(json.get("prompt_id").is_none());
        assert!(json.get("prompt_variables").is_none());
    }

    #[test]
    fn test_numeric_fields_use_leading_number() {
        let form = chat_form("chat")
            .with_field("temperature", " 0.7abc")
            .with_field("max_tokens", "512 tokens")
            .with_field("top_p", "abc");
        let json = built(StepKind::ChatCompletion, &form);

        assert_eq!(json["temperature"], json!(0.7));
        assert_eq!(json["max_tokens"], json!(512));
        assert!(json.get("top_p").is_none());
    }

    #[test]
    fn test_parse_float_and_int() {
        assert_eq!(parse_float("1e3"), Some(1000.0));
        assert_eq!(parse_float(".5"), Some(0.5));
        assert_eq!(parse_float("-2.5x"), Some(-2.5));
        assert_eq!(parse_float(""), None);
        assert_eq!(parse_float("NaN"), None);
        assert_eq!(parse_int("42.9"), Some(42));
        assert_eq!(parse_int("x42"), None);
    }

    #[test]
    fn test_prompt_variables_only_non_blank() {
        let form = chat_form("chat")
            .with_field("prompt_id", "assistant")
            .with_prompt_content("You are ${var:persona:helpful}. Speak ${var:language}. ${var:tone}")
            .with_prompt_variable("persona", "a pirate")
            .with_prompt_variable("language", "   ")
            .with_prompt_variable("unrelated", "ignored");
        let json = built(StepKind::ChatCompletion, &form);

        assert_eq!(json["prompt_id"], json!("assistant"));
        assert_eq!(json["prompt_variables"], json!({"persona": "a pirate"}));
    }

    #[test]
    fn test_prompt_variables_omitted_when_none_supplied() {
        let form = chat_form("chat").with_prompt_content("Hello ${var:name}");
        let json = built(StepKind::ChatCompletion, &form);
        assert!(json.get("prompt_variables").is_none());
    }

    #[test]
    fn test_kb_search_step_with_filter() {
        let form = StepForm::new()
            .with_field("name", "search")
            .with_field("knowledge_base_id", "docs")
            .with_field("query", "${request:question}")
            .with_field("top_k", "")
            .with_field("min_score", "0.75")
            .with_filter_row(FilterRow::new("category", FilterOperator::Eq, "manual"))
            .with_filter_row(FilterRow::new("", FilterOperator::Eq, "dropped"));
        let json = built(StepKind::KnowledgeBaseSearch, &form);

        assert_eq!(json["type"], json!("knowledge_base_search"));
        assert_eq!(json["top_k"], json!(5));
        assert_eq!(json["min_score"], json!(0.75));
        assert_eq!(
            json["filter"],
            json!({
                "connector": "and",
                "filters": [{"key": "category", "operator": "eq", "value": "manual"}]
            })
        );
    }

    #[test]
    fn test_kb_search_without_filter_rows_omits_filter() {
        let form = StepForm::new()
            .with_field("name", "search")
            .with_field("knowledge_base_id", "docs")
            .with_field("query", "q")
            .with_field("top_k", "12");
        let json = built(StepKind::KnowledgeBaseSearch, &form);

        assert_eq!(json["top_k"], json!(12));
        assert!(json.get("filter").is_none());
        assert!(json.get("min_score").is_none());
    }

    #[test]
    fn test_crag_step_defaults_threshold() {
        let form = StepForm::new()
            .with_field("name", "grade")
            .with_field("model_id", "gpt-4o")
            .with_field("prompt_id", "crag-scorer")
            .with_field("documents_source", "${step:search:documents}")
            .with_field("query", "${request:question}")
            .with_field("threshold", "high");
        let json = built(StepKind::CragScoring, &form);

        assert_eq!(json["threshold"], json!(0.5));
        assert_eq!(json["documents_source"], json!("${step:search:documents}"));
    }

    #[test]
    fn test_conditional_step_from_json_text() {
        let form = StepForm::new()
            .with_field("name", "gate")
            .with_field(
                "conditions",
                r#"[{"field": "${step:search:total}", "operator": "equals", "value": 0,
                     "action": {"end_workflow": {"error": "No documents"}}}]"#,
            )
            .with_field("default_action", "skip_step");

        let step = build_step(StepKind::Conditional, &form).unwrap();
        let WorkflowStepType::Conditional(cond) = step.step_type() else {
            panic!("Expected a conditional step");
        };

        assert_eq!(cond.conditions.len(), 1);
        assert_eq!(cond.conditions[0].operator, ConditionOperator::Equals);
        assert_eq!(
            cond.conditions[0].action,
            ConditionalAction::end_with_error("No documents")
        );
        assert_eq!(cond.default_action, DefaultAction::SkipStep);
    }

    #[test]
    fn test_conditional_step_malformed_json() {
        let form = StepForm::new()
            .with_field("name", "gate")
            .with_field("conditions", "[{not json");

        let err = build_step(StepKind::Conditional, &form).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidJson { ref field, .. } if field == "conditions"));

        let form = StepForm::new()
            .with_field("name", "gate")
            .with_field("conditions", "[]");
        assert!(matches!(
            build_step(StepKind::Conditional, &form),
            Err(WorkflowError::MissingField { .. })
        ));
    }

    #[test]
    fn test_http_request_step_from_form() {
        let form = StepForm::new()
            .with_field("name", "lookup")
            .with_field("external_api_id", "crm")
            .with_field("method", "post")
            .with_field("path", "")
            .with_field("timeout_ms", "")
            .with_field("headers", r#"{"X-User": "${request:user_id}", "X-Retry": 2}"#)
            .with_field("body", "{}")
            .with_field("fail_on_error", "false")
            .with_field("extract_path", "$.data");
        let json = built(StepKind::HttpRequest, &form);

        assert_eq!(json["method"], json!("POST"));
        assert_eq!(json["path"], json!("/"));
        assert_eq!(json["timeout_ms"], json!(30000));
        assert_eq!(
            json["headers"],
            json!({"X-User": "${request:user_id}", "X-Retry": "2"})
        );
        assert!(json.get("body").is_none());
        assert!(json.get("credential_id").is_none());
        assert_eq!(json["fail_on_error"], json!(false));
        assert_eq!(json["extract_path"], json!("$.data"));
    }

    #[test]
    fn test_http_request_invalid_json() {
        let form = StepForm::new()
            .with_field("name", "lookup")
            .with_field("external_api_id", "crm")
            .with_field("body", "{\"q\": ");

        let err = build_step(StepKind::HttpRequest, &form).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidJson { ref field, .. } if field == "body"));

        let form = StepForm::new()
            .with_field("name", "lookup")
            .with_field("external_api_id", "crm")
            .with_field("headers", "[1, 2]");
        let err = build_step(StepKind::HttpRequest, &form).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidJson { ref field, .. } if field == "headers"));
    }

    #[test]
    fn test_on_error_from_form() {
        let form = chat_form("chat").with_field("on_error", "skip_step");
        let step = build_step(StepKind::ChatCompletion, &form).unwrap();
        assert_eq!(step.on_error(), OnErrorAction::SkipStep);
    }

    #[test]
    fn test_form_round_trip_from_step() {
        let form = StepForm::new()
            .with_field("name", "search")
            .with_field("knowledge_base_id", "docs")
            .with_field("query", "${request:question}")
            .with_field("min_score", "0.3")
            .with_filter_connector(FilterConnector::Or)
            .with_filter_row(FilterRow::new("status", FilterOperator::In, "a, b"));

        let step = build_step(StepKind::KnowledgeBaseSearch, &form).unwrap();
        let rebuilt = build_step(StepKind::KnowledgeBaseSearch, &StepForm::from_step(&step)).unwrap();

        assert_eq!(step, rebuilt);
    }

    #[test]
    fn test_form_round_trip_http_and_conditional() {
        let http = WorkflowStep::new(
            "lookup",
            WorkflowStepType::HttpRequest(
                HttpRequestStep::new("crm")
                    .with_method(HttpMethod::Put)
                    .with_header("X-Key", "v")
                    .with_body(json!({"id": "${request:id}"})),
            ),
        );
        let rebuilt = build_step(StepKind::HttpRequest, &StepForm::from_step(&http)).unwrap();
        assert_eq!(http, rebuilt);

        let gate = WorkflowStep::new(
            "gate",
            WorkflowStepType::Conditional(ConditionalStep::new(vec![Condition::new(
                "${step:search:total}",
                ConditionOperator::GreaterThan,
                ConditionalAction::go_to_step("answer"),
            )
            .with_value(json!(3))])),
        );
        let rebuilt = build_step(StepKind::Conditional, &StepForm::from_step(&gate)).unwrap();
        assert_eq!(gate, rebuilt);
    }

    #[test]
    fn test_form_round_trip_chat_keeps_prompt_variables() {
        let chat = WorkflowStep::new(
            "answer",
            WorkflowStepType::ChatCompletion(
                ChatCompletionStep::new("gpt-4o", "${request:question}")
                    .with_prompt("rag-system")
                    .with_prompt_variable("context", "${step:search:documents}")
                    .with_prompt_variable("tone", "formal")
                    .with_temperature(0.7)
                    .with_max_tokens(512),
            ),
        )
        .with_on_error(OnErrorAction::SkipStep);

        let rebuilt = build_step(StepKind::ChatCompletion, &StepForm::from_step(&chat)).unwrap();
        assert_eq!(chat, rebuilt);
    }

    #[test]
    fn test_form_round_trip_crag() {
        let crag = WorkflowStep::new(
            "grade",
            WorkflowStepType::CragScoring(
                CragScoringStep::new(
                    "gpt-4o",
                    "crag-scorer",
                    "${step:search:documents}",
                    "${request:question}",
                )
                .with_threshold(0.8)
                .with_prompt_variables(BTreeMap::from([(
                    "criteria".to_string(),
                    "strict".to_string(),
                )])),
            ),
        );

        let rebuilt = build_step(StepKind::CragScoring, &StepForm::from_step(&crag)).unwrap();
        assert_eq!(crag, rebuilt);
    }

    #[test]
    fn test_reopened_step_drops_only_blank_variables() {
        let chat = WorkflowStep::new(
            "answer",
            WorkflowStepType::ChatCompletion(
                ChatCompletionStep::new("gpt-4o", "Hi")
                    .with_prompt("rag-system")
                    .with_prompt_variable("context", "${step:search:documents}"),
            ),
        );

        let form = StepForm::from_step(&chat)
            .with_prompt_variable("tone", "  ")
            .with_prompt_variable("persona", "a pirate");
        let json = built(StepKind::ChatCompletion, &form);

        assert_eq!(
            json["prompt_variables"],
            json!({"context": "${step:search:documents}", "persona": "a pirate"})
        );
    }

    #[test]
    fn test_map_fields_serialize_in_stable_order() {
        let form = chat_form("chat")
            .with_prompt_variable("zeta", "z")
            .with_prompt_variable("alpha", "a");
        let text = serde_json::to_string(&build_step(StepKind::ChatCompletion, &form).unwrap())
            .unwrap();
        assert!(text.contains(r#""prompt_variables":{"alpha":"a","zeta":"z"}"#));

        let form = StepForm::new()
            .with_field("name", "lookup")
            .with_field("external_api_id", "crm")
            .with_field("headers", r#"{"X-Trace": "t", "Accept": "json"}"#);
        let text = serde_json::to_string(&build_step(StepKind::HttpRequest, &form).unwrap())
            .unwrap();
        assert!(text.contains(r#""headers":{"Accept":"json","X-Trace":"t"}"#));
    }

    #[test]
    fn test_add_or_update_step_uniqueness() {
        let mut steps = Vec::new();
        let search = build_step(StepKind::ChatCompletion, &chat_form("search")).unwrap();

        assert_eq!(add_or_update_step(&mut steps, search.clone(), None).unwrap(), 0);

        let err = add_or_update_step(&mut steps, search.clone(), None).unwrap_err();
        assert_eq!(err, WorkflowError::duplicate_name("search"));

        // Editing the same index with the same name succeeds
        assert_eq!(add_or_update_step(&mut steps, search, Some(0)).unwrap(), 0);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_add_or_update_step_rename_clash() {
        let mut steps = vec![
            build_step(StepKind::ChatCompletion, &chat_form("first")).unwrap(),
            build_step(StepKind::ChatCompletion, &chat_form("second")).unwrap(),
        ];

        let renamed = build_step(StepKind::ChatCompletion, &chat_form("first")).unwrap();
        assert!(matches!(
            add_or_update_step(&mut steps, renamed, Some(1)),
            Err(WorkflowError::DuplicateName { .. })
        ));

        let other = build_step(StepKind::ChatCompletion, &chat_form("third")).unwrap();
        assert_eq!(
            add_or_update_step(&mut steps, other, Some(5)),
            Err(WorkflowError::StepIndexOutOfRange(5))
        );
    }

    #[test]
    fn test_remove_and_move_steps() {
        let mut steps: Vec<WorkflowStep> = ["a", "b", "c"]
            .iter()
            .map(|n| build_step(StepKind::ChatCompletion, &chat_form(n)).unwrap())
            .collect();

        move_step(&mut steps, 0, 2).unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);

        move_step(&mut steps, 2, 0).unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        let removed = remove_step(&mut steps, 1).unwrap();
        assert_eq!(removed.name(), "b");
        assert!(remove_step(&mut steps, 2).is_err());
        assert!(move_step(&mut steps, 0, 2).is_err());
    }
}
