//! Variable reference syntax and scope rules
//!
//! Template strings may embed:
//! - `${request:field}` / `${request:field:default}` - workflow execution input
//! - `${step:step-name:field}` / `${step:step-name:field:default}` - output of an earlier step
//! - `${var:name}` / `${var:name:default}` - prompt template variable
//!
//! References are advisory at authoring time. Anything that does not match the
//! grammar is plain text and never an error.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::entity::WorkflowStep;
use super::registry::StepKind;

/// All reference forms, in order of appearance
static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\$\{(?:",
        r"request:(?P<request_field>[a-zA-Z0-9_.-]+)(?::(?P<request_default>[^}]*))?",
        r"|step:(?P<step_name>[a-zA-Z0-9_-]+):(?P<step_field>[a-zA-Z0-9_.-]+)(?::(?P<step_default>[^}]*))?",
        r"|var:(?P<var_name>[a-zA-Z_][a-zA-Z0-9_-]*)(?::(?P<var_default>[^}]*))?",
        r")\}"
    ))
    .unwrap()
});

/// Prompt variable: ${var:name} or ${var:name:default}
static VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{var:([a-zA-Z_][a-zA-Z0-9_-]*)(?::([^}]*))?\}").unwrap());

/// A parsed variable reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableRef {
    /// Reference to a request input field
    Request {
        field: String,
        default: Option<String>,
    },

    /// Reference to a step output field
    Step {
        step_name: String,
        field: String,
        default: Option<String>,
    },

    /// Reference to a prompt template variable
    Var {
        name: String,
        default: Option<String>,
    },
}

impl VariableRef {
    pub fn has_default(&self) -> bool {
        match self {
            Self::Request { default, .. }
            | Self::Step { default, .. }
            | Self::Var { default, .. } => default.is_some(),
        }
    }

    /// The literal form of this reference
    pub fn to_literal(&self) -> String {
        let (body, default) = match self {
            Self::Request { field, default } => (format!("request:{}", field), default),
            Self::Step {
                step_name,
                field,
                default,
            } => (format!("step:{}:{}", step_name, field), default),
            Self::Var { name, default } => (format!("var:{}", name), default),
        };

        match default {
            Some(d) => format!("${{{}:{}}}", body, d),
            None => format!("${{{}}}", body),
        }
    }
}

/// Literal form of a request field reference
pub fn request_reference(field: &str) -> String {
    format!("${{request:{}}}", field)
}

/// Literal form of a step output reference
pub fn step_reference(step_name: &str, field: &str) -> String {
    format!("${{step:{}:{}}}", step_name, field)
}

/// Extract every reference token from a template string, in order of appearance
pub fn parse_references(text: &str) -> Vec<VariableRef> {
    REFERENCE_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let owned = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

            if let Some(field) = owned("request_field") {
                Some(VariableRef::Request {
                    field,
                    default: owned("request_default"),
                })
            } else if let (Some(step_name), Some(field)) = (owned("step_name"), owned("step_field"))
            {
                Some(VariableRef::Step {
                    step_name,
                    field,
                    default: owned("step_default"),
                })
            } else {
                owned("var_name").map(|name| VariableRef::Var {
                    name,
                    default: owned("var_default"),
                })
            }
        })
        .collect()
}

/// Check if a string contains any variable references
pub fn has_references(text: &str) -> bool {
    REFERENCE_PATTERN.is_match(text)
}

/// A prompt variable discovered in template text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptVariable {
    pub name: String,
    /// Default value, empty when the token has none
    pub default: String,
}

/// Extract `${var:..}` tokens, deduplicated by name with the first occurrence winning
pub fn extract_prompt_variables(text: &str) -> Vec<PromptVariable> {
    let mut seen = HashSet::new();
    let mut variables = Vec::new();

    for caps in VAR_PATTERN.captures_iter(text) {
        let name = &caps[1];

        if !seen.insert(name.to_string()) {
            continue;
        }

        variables.push(PromptVariable {
            name: name.to_string(),
            default: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        });
    }

    variables
}

/// A request input field that can be referenced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub description: String,
    pub syntax: String,
}

/// A single output of an earlier step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputReference {
    pub name: String,
    pub syntax: String,
    pub description: String,
}

/// Outputs exposed by one earlier step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutputs {
    pub step_name: String,
    pub step_type: StepKind,
    pub outputs: Vec<OutputReference>,
}

/// Reference targets valid at a given step position
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AvailableReferences {
    pub request_fields: Vec<RequestField>,
    pub step_outputs: Vec<StepOutputs>,
}

impl AvailableReferences {
    pub fn is_empty(&self) -> bool {
        self.request_fields.is_empty() && self.step_outputs.is_empty()
    }

    /// Every literal that may be inserted at this position
    pub fn literals(&self) -> Vec<&str> {
        self.request_fields
            .iter()
            .map(|f| f.syntax.as_str())
            .chain(
                self.step_outputs
                    .iter()
                    .flat_map(|s| s.outputs.iter().map(|o| o.syntax.as_str())),
            )
            .collect()
    }
}

/// Compute the references available to the step at `upto_index`
///
/// Only steps strictly before `upto_index` can have executed, so only their
/// outputs are offered. Request fields come from `input_schema.properties`.
pub fn available_references(
    steps: &[WorkflowStep],
    upto_index: usize,
    input_schema: Option<&Value>,
) -> AvailableReferences {
    let request_fields = input_schema
        .and_then(|schema| schema.get("properties"))
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .map(|(name, prop)| RequestField {
                    name: name.clone(),
                    field_type: prop
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("any")
                        .to_string(),
                    description: prop
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    syntax: request_reference(name),
                })
                .collect()
        })
        .unwrap_or_default();

    let step_outputs = steps
        .iter()
        .take(upto_index)
        .map(|step| {
            let kind = StepKind::of(step.step_type());

            StepOutputs {
                step_name: step.name().to_string(),
                step_type: kind,
                outputs: kind
                    .output_variables()
                    .iter()
                    .map(|output| OutputReference {
                        name: output.name.to_string(),
                        syntax: step_reference(step.name(), output.name),
                        description: output.description.to_string(),
                    })
                    .collect(),
            }
        })
        .collect();

    AvailableReferences {
        request_fields,
        step_outputs,
    }
}

/// A text field being edited, with an optional cursor position in characters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    cursor: Option<usize>,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: usize) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Splice `literal` at the cursor (or append without one); the cursor ends right after it
    pub fn insert_reference(&mut self, literal: &str) -> usize {
        let char_len = self.text.chars().count();
        let at = self.cursor.unwrap_or(char_len).min(char_len);

        let byte_at = self
            .text
            .char_indices()
            .nth(at)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len());

        self.text.insert_str(byte_at, literal);

        let cursor = at + literal.chars().count();
        self.cursor = Some(cursor);
        cursor
    }
}
