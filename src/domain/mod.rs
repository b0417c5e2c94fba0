//! Domain layer - workflow authoring model and the admin API contract

pub mod admin_api;
pub mod error;
pub mod knowledge_base;
pub mod workflow;

pub use admin_api::{
    AdminApi, AdminResource, CredentialSummary, ExternalApiSummary, KnowledgeBaseSummary,
    ModelSummary, PromptSummary, UploadFile,
};
pub use error::DomainError;
pub use knowledge_base::{
    FilterBuilder, FilterCondition, FilterConnector, FilterError, FilterExpression,
    FilterOperator, FilterRow, IngestionOperation, IngestionStatus,
};
pub use workflow::{
    AuthoringSession, ChatCompletionStep, Condition, ConditionOperator, ConditionalAction,
    ConditionalStep, CragScoringStep, HttpRequestStep, KnowledgeBaseSearchStep, OnErrorAction,
    StepForm, StepKind, VariableRef, Workflow, WorkflowDraft, WorkflowError, WorkflowId,
    WorkflowPayload, WorkflowStep, WorkflowStepType,
};
