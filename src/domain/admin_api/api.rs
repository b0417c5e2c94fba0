//! Admin API trait

use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use super::resource::AdminResource;
use super::types::{
    CredentialSummary, ExternalApiSummary, KnowledgeBaseSummary, ModelSummary, PromptSummary,
    UploadFile,
};
use crate::domain::error::DomainError;
use crate::domain::knowledge_base::IngestionOperation;
use crate::domain::workflow::{Workflow, WorkflowId, WorkflowPayload};

/// Client for the gateway's administrative REST API
///
/// Failures carry the backend's error message verbatim.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_workflows(&self) -> Result<Vec<Workflow>, DomainError>;

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Workflow, DomainError>;

    /// Creates a workflow; the payload must carry an `id`
    async fn create_workflow(&self, payload: &WorkflowPayload) -> Result<Workflow, DomainError>;

    async fn update_workflow(
        &self,
        id: &WorkflowId,
        payload: &WorkflowPayload,
    ) -> Result<Workflow, DomainError>;

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), DomainError>;

    async fn list_models(&self) -> Result<Vec<ModelSummary>, DomainError>;

    async fn list_prompts(&self) -> Result<Vec<PromptSummary>, DomainError>;

    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSummary>, DomainError>;

    async fn list_credentials(&self) -> Result<Vec<CredentialSummary>, DomainError>;

    async fn list_external_apis(&self) -> Result<Vec<ExternalApiSummary>, DomainError>;

    /// Uploads files to a knowledge base, one multipart part per file
    async fn ingest_files(
        &self,
        knowledge_base_id: &str,
        files: Vec<UploadFile>,
    ) -> Result<Value, DomainError>;

    async fn list_ingestion_operations(
        &self,
        knowledge_base_id: &str,
    ) -> Result<Vec<IngestionOperation>, DomainError>;

    async fn list(&self, resource: AdminResource) -> Result<Vec<Value>, DomainError>;

    async fn get(&self, resource: AdminResource, id: &str) -> Result<Value, DomainError>;

    async fn create(&self, resource: AdminResource, body: &Value) -> Result<Value, DomainError>;

    async fn update(
        &self,
        resource: AdminResource,
        id: &str,
        body: &Value,
    ) -> Result<Value, DomainError>;

    async fn delete(&self, resource: AdminResource, id: &str) -> Result<(), DomainError>;

    /// Invokes `POST /<resource>/<id>/<action>`, e.g. `api-keys/k1/revoke`
    async fn action(
        &self,
        resource: AdminResource,
        id: &str,
        action: &str,
        body: &Value,
    ) -> Result<Value, DomainError>;
}
