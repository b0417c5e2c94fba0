//! Workflow definition entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::WorkflowError;
use super::step_types::WorkflowStepType;

/// Maximum length for workflow IDs
pub const MAX_ID_LENGTH: usize = 50;

/// Values the backend accepts for a step's `on_error` field
pub const ON_ERROR_VALUES: [&str; 2] = ["fail_workflow", "skip_step"];

/// Regex pattern for valid workflow IDs: alphanumeric and hyphens
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]$|^[a-zA-Z0-9]$").unwrap());

/// Validated workflow identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Create a new validated workflow ID
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowError> {
        let id = id.into();
        validate_workflow_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkflowId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkflowId> for String {
    fn from(id: WorkflowId) -> Self {
        id.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for WorkflowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a workflow ID string
pub fn validate_workflow_id(id: &str) -> Result<(), WorkflowError> {
    if id.is_empty() {
        return Err(WorkflowError::invalid_id("Workflow ID cannot be empty"));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(WorkflowError::invalid_id(format!(
            "Workflow ID exceeds maximum length of {} characters",
            MAX_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(WorkflowError::invalid_id(format!(
            "'{}' must be alphanumeric with hyphens, start and end with alphanumeric",
            id
        )));
    }

    Ok(())
}

/// Action to take when a step fails
///
/// Older workflow documents used `fail`, `skip` and `continue`; those are accepted on
/// input and written back in the current form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorAction {
    /// Stop the workflow and return an error
    #[default]
    #[serde(alias = "fail")]
    FailWorkflow,

    /// Skip this step and continue to the next
    #[serde(alias = "skip", alias = "continue")]
    SkipStep,
}

impl OnErrorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailWorkflow => ON_ERROR_VALUES[0],
            Self::SkipStep => ON_ERROR_VALUES[1],
        }
    }
}

impl std::str::FromStr for OnErrorAction {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_workflow" | "fail" => Ok(Self::FailWorkflow),
            "skip_step" | "skip" | "continue" => Ok(Self::SkipStep),
            other => Err(WorkflowError::validation(format!(
                "Invalid on_error value '{}': expected one of {}",
                other,
                ON_ERROR_VALUES.join(", ")
            ))),
        }
    }
}

/// A step within a workflow (wrapper around step type with metadata)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    /// Unique name for this step within the workflow
    name: String,

    /// The step type and configuration
    #[serde(flatten)]
    step_type: WorkflowStepType,

    /// Action to take on error
    #[serde(default)]
    on_error: OnErrorAction,
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, step_type: WorkflowStepType) -> Self {
        Self {
            name: name.into(),
            step_type,
            on_error: OnErrorAction::default(),
        }
    }

    pub fn with_on_error(mut self, action: OnErrorAction) -> Self {
        self.on_error = action;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_type(&self) -> &WorkflowStepType {
        &self.step_type
    }

    pub fn on_error(&self) -> OnErrorAction {
        self.on_error
    }
}

/// A workflow definition as stored by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    id: WorkflowId,

    /// Human-readable name
    name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// Optional JSON Schema describing the execution input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_schema: Option<serde_json::Value>,

    /// Ordered list of workflow steps
    #[serde(default)]
    steps: Vec<WorkflowStep>,

    /// Configuration version, owned by the backend
    #[serde(default = "default_version")]
    version: u32,

    /// Whether the workflow is enabled
    #[serde(default = "default_enabled")]
    enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

impl Workflow {
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            input_schema: None,
            steps: Vec::new(),
            version: 1,
            enabled: true,
            created_at: None,
            updated_at: None,
        }
    }

    // Builder methods

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    // Getters

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn input_schema(&self) -> Option<&serde_json::Value> {
        self.input_schema.as_ref()
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Get the index of a step by name
    pub fn get_step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == name)
    }
}
