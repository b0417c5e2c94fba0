//! Workflow domain module
//!
//! Authoring-side model of the gateway's multi-step workflows. Workflows chain:
//! - Chat completions with LLM models
//! - Knowledge base searches
//! - CRAG (Corrective RAG) document scoring
//! - Conditional branching
//! - HTTP requests to external APIs
//!
//! Execution happens on the gateway; this module builds, checks and summarizes the
//! documents it stores.
//!
//! ## Variable References
//!
//! Template fields may embed references that the gateway resolves at run time:
//! - `${request:field}` / `${request:field:default}` - workflow execution input
//! - `${step:step-name:field}` / `${step:step-name:field:default}` - earlier step output
//! - `${var:name}` / `${var:name:default}` - prompt template variable

mod assembler;
mod entity;
mod error;
mod references;
mod registry;
mod session;
mod step_types;
mod summary;

pub use assembler::{
    lint_references, validate, DraftTarget, ReferenceWarning, WorkflowDraft, WorkflowPayload,
};
pub use entity::{
    validate_workflow_id, OnErrorAction, Workflow, WorkflowId, WorkflowStep, MAX_ID_LENGTH,
    ON_ERROR_VALUES,
};
pub use error::WorkflowError;
pub use references::{
    available_references, extract_prompt_variables, has_references, parse_references,
    request_reference, step_reference, AvailableReferences, OutputReference, PromptVariable,
    RequestField, StepOutputs, TextBuffer, VariableRef,
};
pub use registry::{
    add_or_update_step, build_step, move_step, parse_float, parse_int, remove_step,
    OutputVariable, StepForm, StepKind,
};
pub use session::{AuthoringSession, SaveOutcome, SessionState};
pub use step_types::{
    ChatCompletionStep, Condition, ConditionOperator, ConditionalAction, ConditionalStep,
    CragScoringStep, DefaultAction, EndWorkflowOutput, HttpMethod, HttpRequestStep,
    KnowledgeBaseSearchStep, WorkflowStepType,
};
pub use summary::{
    action_badge, render_summary, truncate, ActionBadge, BadgeColor, ConditionLine,
    ConditionSummary,
};
