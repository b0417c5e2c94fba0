//! reqwest implementation of the admin API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::domain::admin_api::{
    extract_list, AdminApi, AdminResource, CredentialSummary, ExternalApiSummary,
    KnowledgeBaseSummary, ModelSummary, PromptSummary, UploadFile,
};
use crate::domain::knowledge_base::IngestionOperation;
use crate::domain::workflow::{Workflow, WorkflowId, WorkflowPayload};
use crate::domain::DomainError;

/// Admin API client over HTTP
#[derive(Debug, Clone)]
pub struct HttpAdminApi {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpAdminApi {
    pub fn new(config: &ApiConfig) -> Result<Self, DomainError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DomainError::configuration(format!("Invalid API base URL '{}': {}", config.base_url, e))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(DomainError::configuration(format!(
                "API base URL '{}' cannot have paths appended",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DomainError> {
        let mut url = self.base_url.clone();

        url.path_segments_mut()
            .map_err(|_| DomainError::configuration("API base URL cannot have paths appended"))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, DomainError> {
        let url = self.endpoint(segments)?;
        debug!(method = %method, url = %url, "Admin API request");

        let mut request = self.client.request(method, url);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        Ok(request)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DomainError> {
        let response = request
            .send()
            .await
            .map_err(|e| DomainError::network(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(response)
    }

    async fn send_value(&self, request: RequestBuilder) -> Result<Value, DomainError> {
        let response = self.send(request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DomainError::network(format!("Failed to read response: {}", e)))?;

        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| DomainError::parse(format!("Failed to parse response: {}", e)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, DomainError> {
        let value = self.send_value(request).await?;
        serde_json::from_value(value)
            .map_err(|e| DomainError::parse(format!("Unexpected response shape: {}", e)))
    }

    async fn list_typed<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        key: &str,
    ) -> Result<Vec<T>, DomainError> {
        let body = self.send_value(self.request(Method::GET, segments)?).await?;

        extract_list(body, key)
            .into_iter()
            .map(|item| {
                serde_json::from_value(item)
                    .map_err(|e| DomainError::parse(format!("Unexpected {} entry: {}", key, e)))
            })
            .collect()
    }
}

/// Error for a non-2xx response, carrying the backend's message verbatim
async fn error_from_response(response: Response) -> DomainError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| error_message(&body))
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {}", status));

    DomainError::http_status(status.as_u16(), message)
}

/// `{"error": {"message"}}`, `{"message"}` or `{"error": "..."}`
fn error_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl AdminApi for HttpAdminApi {
    async fn list_workflows(&self) -> Result<Vec<Workflow>, DomainError> {
        self.list_typed(&["workflows"], "workflows").await
    }

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Workflow, DomainError> {
        self.send_json(self.request(Method::GET, &["workflows", id.as_str()])?)
            .await
    }

    async fn create_workflow(&self, payload: &WorkflowPayload) -> Result<Workflow, DomainError> {
        if payload.id.is_none() {
            return Err(DomainError::internal("Creating a workflow requires an id"));
        }

        self.send_json(self.request(Method::POST, &["workflows"])?.json(payload))
            .await
    }

    async fn update_workflow(
        &self,
        id: &WorkflowId,
        payload: &WorkflowPayload,
    ) -> Result<Workflow, DomainError> {
        self.send_json(
            self.request(Method::PUT, &["workflows", id.as_str()])?
                .json(payload),
        )
        .await
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<(), DomainError> {
        self.send(self.request(Method::DELETE, &["workflows", id.as_str()])?)
            .await?;
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<ModelSummary>, DomainError> {
        self.list_typed(&["models"], "models").await
    }

    async fn list_prompts(&self) -> Result<Vec<PromptSummary>, DomainError> {
        self.list_typed(&["prompts"], "prompts").await
    }

    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSummary>, DomainError> {
        self.list_typed(&["knowledge-bases"], "knowledge_bases")
            .await
    }

    async fn list_credentials(&self) -> Result<Vec<CredentialSummary>, DomainError> {
        self.list_typed(&["credentials"], "credentials").await
    }

    async fn list_external_apis(&self) -> Result<Vec<ExternalApiSummary>, DomainError> {
        self.list_typed(&["external-apis"], "external_apis").await
    }

    async fn ingest_files(
        &self,
        knowledge_base_id: &str,
        files: Vec<UploadFile>,
    ) -> Result<Value, DomainError> {
        if files.is_empty() {
            return Err(DomainError::configuration("No files to upload"));
        }

        let mut form = Form::new();

        for file in files {
            let mime = file.mime_type();
            let part = Part::bytes(file.content)
                .file_name(file.file_name)
                .mime_str(&mime)
                .map_err(|e| DomainError::internal(format!("Invalid content type '{}': {}", mime, e)))?;

            form = form.part("files", part);
        }

        self.send_value(
            self.request(
                Method::POST,
                &["knowledge-bases", knowledge_base_id, "documents", "upload"],
            )?
            .multipart(form),
        )
        .await
    }

    async fn list_ingestion_operations(
        &self,
        knowledge_base_id: &str,
    ) -> Result<Vec<IngestionOperation>, DomainError> {
        self.list_typed(&["knowledge-bases", knowledge_base_id, "ingestions"], "operations")
            .await
    }

    async fn list(&self, resource: AdminResource) -> Result<Vec<Value>, DomainError> {
        let body = self
            .send_value(self.request(Method::GET, &[resource.as_str()])?)
            .await?;

        Ok(extract_list(body, resource.list_key()))
    }

    async fn get(&self, resource: AdminResource, id: &str) -> Result<Value, DomainError> {
        self.send_value(self.request(Method::GET, &[resource.as_str(), id])?)
            .await
    }

    async fn create(&self, resource: AdminResource, body: &Value) -> Result<Value, DomainError> {
        self.send_value(self.request(Method::POST, &[resource.as_str()])?.json(body))
            .await
    }

    async fn update(
        &self,
        resource: AdminResource,
        id: &str,
        body: &Value,
    ) -> Result<Value, DomainError> {
        self.send_value(
            self.request(Method::PUT, &[resource.as_str(), id])?
                .json(body),
        )
        .await
    }

    async fn delete(&self, resource: AdminResource, id: &str) -> Result<(), DomainError> {
        self.send(self.request(Method::DELETE, &[resource.as_str(), id])?)
            .await?;
        Ok(())
    }

    async fn action(
        &self,
        resource: AdminResource,
        id: &str,
        action: &str,
        body: &Value,
    ) -> Result<Value, DomainError> {
        self.send_value(
            self.request(Method::POST, &[resource.as_str(), id, action])?
                .json(body),
        )
        .await
    }
}
