//! Authoring session
//!
//! Owns the workflow being edited, the step under edit and the editor state. A caller
//! (a view, the CLI) keeps one session per workflow it edits; nothing here is global.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::assembler::{
    lint_references, validate, DraftTarget, ReferenceWarning, WorkflowDraft, WorkflowPayload,
};
use super::entity::{Workflow, WorkflowStep};
use super::error::WorkflowError;
use super::references::{available_references, AvailableReferences};
use super::registry::{self, build_step, StepForm, StepKind};
use crate::domain::admin_api::AdminApi;
use crate::domain::error::DomainError;

/// Where the author currently is in the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    EditingMetadata,
    /// Editing a new step (`index: None`) or the step at `index`
    EditingStep {
        kind: StepKind,
        index: Option<usize>,
    },
}

/// Result of a save attempt that did not fail on the network
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// The backend accepted the document
    Persisted(Workflow),
    /// The draft was rejected locally and nothing was sent
    ValidationFailed(WorkflowError),
}

#[derive(Debug, Clone)]
pub struct AuthoringSession {
    draft: WorkflowDraft,
    state: SessionState,
}

impl AuthoringSession {
    /// Start authoring a new workflow
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::from_draft(WorkflowDraft::create(id, name))
    }

    /// Start editing a stored workflow
    pub fn edit(workflow: &Workflow) -> Self {
        Self::from_draft(WorkflowDraft::update(workflow))
    }

    pub fn from_draft(draft: WorkflowDraft) -> Self {
        Self {
            draft,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn draft(&self) -> &WorkflowDraft {
        &self.draft
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.draft.steps
    }

    pub fn is_new(&self) -> bool {
        matches!(self.draft.target, DraftTarget::Create { .. })
    }

    // Metadata

    pub fn edit_metadata(&mut self) {
        self.transition(SessionState::EditingMetadata);
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.draft.name = name.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.draft.description = description.into();
    }

    /// Replace the input schema text; it is parsed on save
    pub fn set_input_schema(&mut self, schema: impl Into<String>) {
        self.draft.input_schema = schema.into();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.draft.enabled = enabled;
    }

    // Steps

    /// Open the editor for a new step of `kind`
    pub fn begin_step(&mut self, kind: StepKind) {
        self.transition(SessionState::EditingStep { kind, index: None });
    }

    /// Open the editor on an existing step, returning its current values
    pub fn edit_step(&mut self, index: usize) -> Result<StepForm, WorkflowError> {
        let step = self
            .draft
            .steps
            .get(index)
            .ok_or(WorkflowError::StepIndexOutOfRange(index))?;

        let kind = StepKind::of(step.step_type());
        let form = StepForm::from_step(step);

        self.transition(SessionState::EditingStep {
            kind,
            index: Some(index),
        });

        Ok(form)
    }

    /// Build the step under edit from `form` and store it
    ///
    /// On error the editor stays open so the author can correct the input.
    pub fn commit_step(&mut self, form: &StepForm) -> Result<usize, WorkflowError> {
        let SessionState::EditingStep { kind, index } = self.state else {
            return Err(WorkflowError::validation("No step is being edited"));
        };

        let step = build_step(kind, form)?;
        let name = step.name().to_string();
        let position = registry::add_or_update_step(&mut self.draft.steps, step, index)?;

        debug!(step = %name, position = position, "Step stored");
        self.transition(SessionState::Idle);

        Ok(position)
    }

    pub fn cancel_step(&mut self) {
        if matches!(self.state, SessionState::EditingStep { .. }) {
            self.transition(SessionState::Idle);
        }
    }

    /// Close whichever editor is open
    pub fn finish(&mut self) {
        self.transition(SessionState::Idle);
    }

    pub fn remove_step(&mut self, index: usize) -> Result<WorkflowStep, WorkflowError> {
        self.ensure_not_editing_step()?;
        registry::remove_step(&mut self.draft.steps, index)
    }

    pub fn move_step(&mut self, from: usize, to: usize) -> Result<(), WorkflowError> {
        self.ensure_not_editing_step()?;
        registry::move_step(&mut self.draft.steps, from, to)
    }

    fn ensure_not_editing_step(&self) -> Result<(), WorkflowError> {
        if matches!(self.state, SessionState::EditingStep { .. }) {
            return Err(WorkflowError::validation(
                "Finish or cancel the step being edited first",
            ));
        }
        Ok(())
    }

    /// References offered while editing the current step
    ///
    /// A new step sees every existing step; an edited step sees the ones before it.
    pub fn available_references(&self) -> AvailableReferences {
        let upto = match self.state {
            SessionState::EditingStep {
                index: Some(index), ..
            } => index,
            _ => self.draft.steps.len(),
        };

        let schema = self.draft.parsed_input_schema();
        available_references(&self.draft.steps, upto, schema.as_ref())
    }

    pub fn lint(&self) -> Vec<ReferenceWarning> {
        let schema: Option<Value> = self.draft.parsed_input_schema();
        lint_references(&self.draft.steps, schema.as_ref())
    }

    pub fn validate(&self) -> Result<WorkflowPayload, WorkflowError> {
        validate(&self.draft)
    }

    /// Validate and hand the document to the backend
    ///
    /// Validation failures never reach the network. Network failures are returned as
    /// errors and leave the session editable for a retry. After a successful create
    /// the session switches to updating the stored workflow.
    pub async fn save<A>(&mut self, api: &A) -> Result<SaveOutcome, DomainError>
    where
        A: AdminApi + ?Sized,
    {
        self.transition(SessionState::Idle);

        let payload = match self.validate() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Workflow draft failed validation");
                return Ok(SaveOutcome::ValidationFailed(e));
            }
        };

        let workflow = match &self.draft.target {
            DraftTarget::Create { .. } => api.create_workflow(&payload).await?,
            DraftTarget::Update { id } => api.update_workflow(id, &payload).await?,
        };

        info!(
            workflow_id = %workflow.id(),
            version = workflow.version(),
            steps = workflow.step_count(),
            "Workflow saved"
        );

        self.draft.target = DraftTarget::Update {
            id: workflow.id().clone(),
        };

        Ok(SaveOutcome::Persisted(workflow))
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Authoring session transition");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::admin_api::MockAdminApi;
    use crate::domain::workflow::entity::WorkflowId;
    use crate::domain::workflow::step_types::{
        ChatCompletionStep, KnowledgeBaseSearchStep, WorkflowStepType,
    };

    fn search_form(name: &str) -> StepForm {
        StepForm::new()
            .with_field("name", name)
            .with_field("knowledge_base_id", "docs")
            .with_field("query", "${request:question}")
    }

    fn session_with_search() -> AuthoringSession {
        let mut session = AuthoringSession::new("rag-qa", "RAG Q&A");
        session.begin_step(StepKind::KnowledgeBaseSearch);
        session.commit_step(&search_form("search")).unwrap();
        session
    }

    fn stored(id: &str) -> Workflow {
        Workflow::new(WorkflowId::new(id).unwrap(), "RAG Q&A").with_step(WorkflowStep::new(
            "search",
            WorkflowStepType::KnowledgeBaseSearch(KnowledgeBaseSearchStep::new("docs", "q")),
        ))
    }

    #[test]
    fn test_state_transitions() {
        let mut session = AuthoringSession::new("rag-qa", "RAG");
        assert_eq!(session.state(), SessionState::Idle);

        session.edit_metadata();
        session.set_input_schema(r#"{"properties": {"question": {"type": "string"}}}"#);
        assert_eq!(session.state(), SessionState::EditingMetadata);

        session.begin_step(StepKind::KnowledgeBaseSearch);
        assert_eq!(
            session.state(),
            SessionState::EditingStep {
                kind: StepKind::KnowledgeBaseSearch,
                index: None
            }
        );

        session.commit_step(&search_form("search")).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.steps().len(), 1);
    }

    #[test]
    fn test_commit_error_keeps_editor_open() {
        let mut session = session_with_search();

        session.begin_step(StepKind::KnowledgeBaseSearch);
        let err = session.commit_step(&search_form("search")).unwrap_err();

        assert_eq!(err, WorkflowError::duplicate_name("search"));
        assert!(matches!(session.state(), SessionState::EditingStep { .. }));
        assert_eq!(session.steps().len(), 1);

        session.cancel_step();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_commit_without_editor() {
        let mut session = AuthoringSession::new("rag-qa", "RAG");
        assert!(matches!(
            session.commit_step(&search_form("search")),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn test_edit_existing_step() {
        let mut session = session_with_search();

        let form = session.edit_step(0).unwrap();
        assert_eq!(form.field("knowledge_base_id"), Some("docs"));

        let form = form.with_field("top_k", "10");
        assert_eq!(session.commit_step(&form).unwrap(), 0);

        let WorkflowStepType::KnowledgeBaseSearch(kb) = session.steps()[0].step_type() else {
            panic!("Expected a knowledge base search step");
        };
        assert_eq!(kb.top_k, 10);
        assert!(session.edit_step(4).is_err());
    }

    #[test]
    fn test_unchanged_edit_keeps_chat_step() {
        let chat = WorkflowStep::new(
            "answer",
            WorkflowStepType::ChatCompletion(
                ChatCompletionStep::new("gpt-4o", "${request:question}")
                    .with_prompt("rag-system")
                    .with_prompt_variable("context", "${step:search:documents}")
                    .with_temperature(0.2),
            ),
        );
        let mut session = AuthoringSession::edit(&stored("rag-qa").with_step(chat.clone()));

        let form = session.edit_step(1).unwrap();
        assert_eq!(session.commit_step(&form).unwrap(), 1);

        assert_eq!(session.steps()[1], chat);
    }

    #[test]
    fn test_available_references_follow_editor_position() {
        let mut session = session_with_search();
        session.set_input_schema(r#"{"properties": {"question": {"type": "string"}}}"#);

        session.begin_step(StepKind::ChatCompletion);
        let refs = session.available_references();
        assert_eq!(refs.request_fields.len(), 1);
        assert_eq!(refs.step_outputs.len(), 1);

        session.cancel_step();
        session.edit_step(0).unwrap();
        assert!(session.available_references().step_outputs.is_empty());
    }

    #[test]
    fn test_remove_blocked_while_editing() {
        let mut session = session_with_search();
        session.begin_step(StepKind::ChatCompletion);
        assert!(session.remove_step(0).is_err());

        session.cancel_step();
        assert_eq!(session.remove_step(0).unwrap().name(), "search");
    }

    #[tokio::test]
    async fn test_save_validation_failure_skips_network() {
        let api = MockAdminApi::new();
        let mut session = AuthoringSession::new("rag-qa", "RAG");

        let outcome = session.save(&api).await.unwrap();

        assert!(matches!(
            outcome,
            SaveOutcome::ValidationFailed(WorkflowError::EmptySteps)
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let mut api = MockAdminApi::new();
        api.expect_create_workflow()
            .withf(|payload| payload.id.as_deref() == Some("rag-qa"))
            .times(1)
            .returning(|_| Ok(stored("rag-qa")));
        api.expect_update_workflow()
            .withf(|id, payload| id.as_str() == "rag-qa" && payload.id.is_none())
            .times(1)
            .returning(|_, _| Ok(stored("rag-qa")));

        let mut session = session_with_search();
        assert!(session.is_new());

        let outcome = session.save(&api).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Persisted(_)));
        assert!(!session.is_new());

        let outcome = session.save(&api).await.unwrap();
        assert!(matches!(outcome, SaveOutcome::Persisted(_)));
    }

    #[tokio::test]
    async fn test_save_network_error_keeps_session() {
        let mut api = MockAdminApi::new();
        api.expect_create_workflow()
            .times(1)
            .returning(|_| Err(DomainError::http_status(409, "Workflow 'rag-qa' already exists")));

        let mut session = session_with_search();
        let err = session.save(&api).await.unwrap_err();

        assert_eq!(err.to_string(), "Workflow 'rag-qa' already exists");
        assert!(session.is_new());
        assert_eq!(session.steps().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_stored_workflow_updates() {
        let mut api = MockAdminApi::new();
        api.expect_update_workflow()
            .times(1)
            .returning(|_, _| Ok(stored("support")));

        let mut session = AuthoringSession::edit(&stored("support"));
        assert!(!session.is_new());

        let outcome = session.save(&api).await.unwrap();
        let SaveOutcome::Persisted(workflow) = outcome else {
            panic!("Expected the workflow to be persisted");
        };
        assert_eq!(workflow.id().as_str(), "support");
    }
}
