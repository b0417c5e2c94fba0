//! Workflow document assembly and pre-submission validation

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use super::entity::{Workflow, WorkflowId, WorkflowStep};
use super::error::WorkflowError;
use super::references::{parse_references, VariableRef};
use super::registry::StepKind;
use super::step_types::{ConditionalAction, WorkflowStepType};

/// Whether a draft creates a new workflow or replaces an existing one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftTarget {
    /// New workflow; the id is chosen by the author and validated on save
    Create { id: String },

    /// Existing workflow; its id is immutable
    Update { id: WorkflowId },
}

/// Workflow metadata and steps as edited, before validation
#[derive(Debug, Clone)]
pub struct WorkflowDraft {
    pub target: DraftTarget,
    pub name: String,
    pub description: String,
    /// JSON Schema as typed; blank means no schema
    pub input_schema: String,
    pub enabled: bool,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDraft {
    pub fn create(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: DraftTarget::Create { id: id.into() },
            name: name.into(),
            description: String::new(),
            input_schema: String::new(),
            enabled: true,
            steps: Vec::new(),
        }
    }

    /// Draft that edits a stored workflow
    pub fn update(workflow: &Workflow) -> Self {
        let input_schema = workflow
            .input_schema()
            .and_then(|schema| serde_json::to_string_pretty(schema).ok())
            .unwrap_or_default();

        Self {
            target: DraftTarget::Update {
                id: workflow.id().clone(),
            },
            name: workflow.name().to_string(),
            description: workflow.description().unwrap_or_default().to_string(),
            input_schema,
            enabled: workflow.is_enabled(),
            steps: workflow.steps().to_vec(),
        }
    }

    /// Read a workflow document from JSON text
    ///
    /// `input_schema` may be an object or the schema's JSON text. When `update` is
    /// set the document's `id` names the workflow being replaced.
    pub fn from_json(text: &str, update: bool) -> Result<Self, WorkflowError> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| WorkflowError::invalid_json("workflow document", e.to_string()))?;

        let str_field = |key: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let id = str_field("id");
        let target = if update {
            DraftTarget::Update {
                id: WorkflowId::new(id)?,
            }
        } else {
            DraftTarget::Create { id }
        };

        let input_schema = match doc.get("input_schema") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(schema) => serde_json::to_string_pretty(schema)
                .map_err(|e| WorkflowError::invalid_json("input_schema", e.to_string()))?,
        };

        let steps = match doc.get("steps") {
            None | Some(Value::Null) => Vec::new(),
            Some(steps) => serde_json::from_value(steps.clone())
                .map_err(|e| WorkflowError::invalid_json("steps", e.to_string()))?,
        };

        Ok(Self {
            target,
            name: str_field("name"),
            description: str_field("description"),
            input_schema,
            enabled: doc.get("enabled").and_then(Value::as_bool).unwrap_or(true),
            steps,
        })
    }

    /// The parsed input schema, `None` when blank or not valid JSON
    pub fn parsed_input_schema(&self) -> Option<Value> {
        parse_input_schema(&self.input_schema).ok().flatten()
    }

    /// The draft as a workflow document that [`from_json`](Self::from_json) reads back
    ///
    /// Unlike [`validate`] this never rejects the draft. A schema that is not valid JSON
    /// is kept as text.
    pub fn to_document(&self) -> Result<Value, WorkflowError> {
        let id = match &self.target {
            DraftTarget::Create { id } => id.clone(),
            DraftTarget::Update { id } => id.as_str().to_string(),
        };

        let input_schema = match parse_input_schema(&self.input_schema) {
            Ok(Some(schema)) => schema,
            Ok(None) => Value::Null,
            Err(_) => Value::String(self.input_schema.clone()),
        };

        let description = match self.description.trim() {
            "" => Value::Null,
            text => Value::String(text.to_string()),
        };

        let steps = serde_json::to_value(&self.steps)
            .map_err(|e| WorkflowError::invalid_json("steps", e.to_string()))?;

        let mut doc = Map::new();
        doc.insert("id".to_string(), Value::String(id));
        doc.insert("name".to_string(), Value::String(self.name.clone()));
        doc.insert("description".to_string(), description);
        doc.insert("input_schema".to_string(), input_schema);
        doc.insert("steps".to_string(), steps);
        doc.insert("enabled".to_string(), Value::Bool(self.enabled));

        Ok(Value::Object(doc))
    }
}

/// Body sent to the workflow storage API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowPayload {
    /// Present only when creating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
    pub steps: Vec<WorkflowStep>,
    pub enabled: bool,
}

fn parse_input_schema(text: &str) -> Result<Option<Value>, WorkflowError> {
    let text = text.trim();

    if text.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| WorkflowError::invalid_json("input_schema", e.to_string()))
}

/// Validate a draft and assemble the document the storage API expects
pub fn validate(draft: &WorkflowDraft) -> Result<WorkflowPayload, WorkflowError> {
    if draft.steps.is_empty() {
        return Err(WorkflowError::EmptySteps);
    }

    let input_schema = parse_input_schema(&draft.input_schema)?;

    let mut seen = HashSet::new();
    for step in &draft.steps {
        if !seen.insert(step.name()) {
            return Err(WorkflowError::duplicate_name(step.name()));
        }
    }

    let name = draft.name.trim();
    if name.is_empty() {
        return Err(WorkflowError::validation("Workflow name is required"));
    }

    let id = match &draft.target {
        DraftTarget::Create { id } => Some(WorkflowId::new(id.trim())?.to_string()),
        DraftTarget::Update { .. } => None,
    };

    // On update `null` means "leave unchanged", so a cleared description is sent as ""
    let description = match (draft.description.trim(), &draft.target) {
        ("", DraftTarget::Create { .. }) => None,
        (text, _) => Some(text.to_string()),
    };

    Ok(WorkflowPayload {
        id,
        name: name.to_string(),
        description,
        input_schema,
        steps: draft.steps.clone(),
        enabled: draft.enabled,
    })
}

/// Advisory finding about a reference that will not resolve at run time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceWarning {
    UnknownStep {
        step: String,
        field: String,
        reference: String,
    },
    LaterStep {
        step: String,
        field: String,
        reference: String,
    },
    UnknownOutput {
        step: String,
        field: String,
        reference: String,
    },
    UnknownRequestField {
        step: String,
        field: String,
        reference: String,
    },
    UnknownJumpTarget {
        step: String,
        target: String,
    },
    /// Resource IDs are resolved when the workflow is saved, not per request
    ResourceReference {
        step: String,
        field: String,
    },
}

impl fmt::Display for ReferenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStep {
                step,
                field,
                reference,
            } => write!(f, "{}.{}: {} refers to a step that does not exist", step, field, reference),
            Self::LaterStep {
                step,
                field,
                reference,
            } => write!(f, "{}.{}: {} refers to a step that has not run yet", step, field, reference),
            Self::UnknownOutput {
                step,
                field,
                reference,
            } => write!(f, "{}.{}: {} is not an output of that step", step, field, reference),
            Self::UnknownRequestField {
                step,
                field,
                reference,
            } => write!(f, "{}.{}: {} is not declared in the input schema", step, field, reference),
            Self::UnknownJumpTarget { step, target } => {
                write!(f, "{}: go_to_step target '{}' does not exist", step, target)
            }
            Self::ResourceReference { step, field } => {
                write!(f, "{}.{}: resource IDs cannot contain variable references", step, field)
            }
        }
    }
}

fn resource_fields(step_type: &WorkflowStepType) -> Vec<(&'static str, &str)> {
    match step_type {
        WorkflowStepType::ChatCompletion(s) => {
            let mut fields = vec![("model_id", s.model_id.as_str())];
            if let Some(prompt_id) = &s.prompt_id {
                fields.push(("prompt_id", prompt_id.as_str()));
            }
            fields
        }
        WorkflowStepType::KnowledgeBaseSearch(s) => {
            vec![("knowledge_base_id", s.knowledge_base_id.as_str())]
        }
        WorkflowStepType::CragScoring(s) => vec![
            ("model_id", s.model_id.as_str()),
            ("prompt_id", s.prompt_id.as_str()),
        ],
        WorkflowStepType::HttpRequest(s) => {
            vec![("external_api_id", s.external_api_id.as_str())]
        }
        WorkflowStepType::Conditional(_) => Vec::new(),
    }
}

/// Check every reference in the steps against the steps before it
///
/// Warnings never block submission. Request fields are only checked when an input
/// schema with `properties` is given.
pub fn lint_references(steps: &[WorkflowStep], input_schema: Option<&Value>) -> Vec<ReferenceWarning> {
    let positions: HashMap<&str, (usize, StepKind)> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name(), (i, StepKind::of(s.step_type()))))
        .collect();

    let declared: Option<HashSet<&str>> = input_schema
        .and_then(|schema| schema.get("properties"))
        .and_then(Value::as_object)
        .map(|props| props.keys().map(String::as_str).collect());

    let mut warnings = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let owner = step.name().to_string();

        for (field, value) in resource_fields(step.step_type()) {
            if value.contains("${") {
                warnings.push(ReferenceWarning::ResourceReference {
                    step: owner.clone(),
                    field: field.to_string(),
                });
            }
        }

        for (field, text) in step.step_type().template_fields() {
            for reference in parse_references(text) {
                let literal = reference.to_literal();
                let context = |reference: String| (owner.clone(), field.to_string(), reference);

                match &reference {
                    VariableRef::Step {
                        step_name,
                        field: output,
                        ..
                    } => match positions.get(step_name.as_str()) {
                        None => {
                            let (step, field, reference) = context(literal);
                            warnings.push(ReferenceWarning::UnknownStep {
                                step,
                                field,
                                reference,
                            });
                        }
                        Some((position, _)) if *position >= index => {
                            let (step, field, reference) = context(literal);
                            warnings.push(ReferenceWarning::LaterStep {
                                step,
                                field,
                                reference,
                            });
                        }
                        Some((_, kind)) => {
                            // Nested paths like `body.items` are checked on their root
                            let root = output.split('.').next().unwrap_or_default();
                            if !kind.output_variables().iter().any(|o| o.name == root) {
                                let (step, field, reference) = context(literal);
                                warnings.push(ReferenceWarning::UnknownOutput {
                                    step,
                                    field,
                                    reference,
                                });
                            }
                        }
                    },
                    VariableRef::Request { field: name, .. } => {
                        let missing = declared
                            .as_ref()
                            .is_some_and(|props| !props.contains(name.as_str()));

                        if missing && !reference.has_default() {
                            let (step, field, reference) = context(literal);
                            warnings.push(ReferenceWarning::UnknownRequestField {
                                step,
                                field,
                                reference,
                            });
                        }
                    }
                    VariableRef::Var { .. } => {}
                }
            }
        }

        if let WorkflowStepType::Conditional(cond) = step.step_type() {
            for condition in &cond.conditions {
                if let ConditionalAction::GoToStep(target) = &condition.action {
                    if !positions.contains_key(target.as_str()) {
                        warnings.push(ReferenceWarning::UnknownJumpTarget {
                            step: owner.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
    }

    warnings
}
