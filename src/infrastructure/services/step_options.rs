//! Step form options - dropdown data for the step editor

use tracing::{debug, instrument};

use crate::domain::admin_api::{
    AdminApi, CredentialSummary, ExternalApiSummary, KnowledgeBaseSummary, ModelSummary,
    PromptSummary,
};
use crate::domain::workflow::StepKind;
use crate::domain::DomainError;

/// Everything the step editor offers in its dropdowns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOptions {
    pub models: Vec<ModelSummary>,
    pub prompts: Vec<PromptSummary>,
    pub knowledge_bases: Vec<KnowledgeBaseSummary>,
    pub credentials: Vec<CredentialSummary>,
    pub external_apis: Vec<ExternalApiSummary>,
}

impl StepOptions {
    pub fn enabled_models(&self) -> impl Iterator<Item = &ModelSummary> {
        self.models.iter().filter(|m| m.enabled)
    }

    pub fn enabled_knowledge_bases(&self) -> impl Iterator<Item = &KnowledgeBaseSummary> {
        self.knowledge_bases.iter().filter(|kb| kb.enabled)
    }

    pub fn prompt(&self, id: &str) -> Option<&PromptSummary> {
        self.prompts.iter().find(|p| p.id == id)
    }

    /// Dropdown labels relevant to a step kind, keyed by the form field they fill
    pub fn fields_for(&self, kind: StepKind) -> Vec<(&'static str, Vec<String>)> {
        match kind {
            StepKind::ChatCompletion => vec![
                ("model_id", self.enabled_models().map(|m| m.to_string()).collect()),
                ("prompt_id", self.prompts.iter().map(|p| p.to_string()).collect()),
            ],
            StepKind::KnowledgeBaseSearch => vec![(
                "knowledge_base_id",
                self.enabled_knowledge_bases().map(|kb| kb.to_string()).collect(),
            )],
            StepKind::CragScoring => vec![
                ("model_id", self.enabled_models().map(|m| m.to_string()).collect()),
                ("prompt_id", self.prompts.iter().map(|p| p.to_string()).collect()),
            ],
            StepKind::Conditional => Vec::new(),
            StepKind::HttpRequest => vec![
                (
                    "external_api_id",
                    self.external_apis
                        .iter()
                        .filter(|api| api.enabled)
                        .map(|api| api.to_string())
                        .collect(),
                ),
                ("credential_id", self.credentials.iter().map(|c| c.to_string()).collect()),
            ],
        }
    }
}

/// Load all dropdown listings concurrently.
///
/// The listings are awaited jointly; the first failure aborts the whole load.
#[instrument(skip(api))]
pub async fn load_step_options<A: AdminApi + ?Sized>(api: &A) -> Result<StepOptions, DomainError> {
    let (models, prompts, knowledge_bases, credentials, external_apis) = futures::try_join!(
        api.list_models(),
        api.list_prompts(),
        api.list_knowledge_bases(),
        api.list_credentials(),
        api.list_external_apis(),
    )?;

    debug!(
        models = models.len(),
        prompts = prompts.len(),
        knowledge_bases = knowledge_bases.len(),
        credentials = credentials.len(),
        external_apis = external_apis.len(),
        "Loaded step options"
    );

    Ok(StepOptions {
        models,
        prompts,
        knowledge_bases,
        credentials,
        external_apis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::admin_api::MockAdminApi;

    fn model(id: &str, enabled: bool) -> ModelSummary {
        ModelSummary {
            id: id.to_string(),
            name: id.to_uppercase(),
            provider: "openai".to_string(),
            provider_model: "gpt-4o".to_string(),
            enabled,
        }
    }

    fn prompt(id: &str) -> PromptSummary {
        PromptSummary {
            id: id.to_string(),
            name: "RAG System".to_string(),
            content: "Answer using ${var:context}".to_string(),
            description: None,
        }
    }

    fn kb(id: &str) -> KnowledgeBaseSummary {
        KnowledgeBaseSummary {
            id: id.to_string(),
            name: "Docs".to_string(),
            description: None,
            kb_type: "pgvector".to_string(),
            enabled: true,
        }
    }

    fn mock_with_listings() -> MockAdminApi {
        let mut api = MockAdminApi::new();
        api.expect_list_models()
            .times(1)
            .returning(|| Ok(vec![model("gpt-4o", true), model("legacy", false)]));
        api.expect_list_prompts()
            .times(1)
            .returning(|| Ok(vec![prompt("rag-system")]));
        api.expect_list_knowledge_bases()
            .times(1)
            .returning(|| Ok(vec![kb("docs")]));
        api.expect_list_credentials().times(1).returning(|| {
            Ok(vec![CredentialSummary {
                id: "crm-token".to_string(),
                name: "CRM token".to_string(),
                credential_type: Some("api_key".to_string()),
            }])
        });
        api.expect_list_external_apis().times(1).returning(|| {
            Ok(vec![ExternalApiSummary {
                id: "crm".to_string(),
                name: "CRM".to_string(),
                description: None,
                base_url: "https://crm.local".to_string(),
                enabled: true,
            }])
        });
        api
    }

    #[tokio::test]
    async fn test_load_all_listings() {
        let api = mock_with_listings();

        let options = load_step_options(&api).await.unwrap();

        assert_eq!(options.models.len(), 2);
        assert_eq!(options.enabled_models().count(), 1);
        assert_eq!(options.knowledge_bases[0].id, "docs");
        assert_eq!(options.external_apis[0].base_url, "https://crm.local");
        assert!(options.prompt("rag-system").is_some());
        assert!(options.prompt("missing").is_none());
    }

    #[tokio::test]
    async fn test_single_failure_aborts_load() {
        let mut api = MockAdminApi::new();
        api.expect_list_models().returning(|| Ok(vec![model("gpt-4o", true)]));
        api.expect_list_prompts()
            .returning(|| Err(DomainError::http_status(503, "Prompt store unavailable")));
        api.expect_list_knowledge_bases().returning(|| Ok(vec![kb("docs")]));
        api.expect_list_credentials().returning(|| Ok(vec![]));
        api.expect_list_external_apis().returning(|| Ok(vec![]));

        let err = load_step_options(&api).await.unwrap_err();

        assert_eq!(err.to_string(), "Prompt store unavailable");
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_fields_for_step_kinds() {
        let options = load_step_options(&mock_with_listings()).await.unwrap();

        let chat = options.fields_for(StepKind::ChatCompletion);
        assert_eq!(chat[0].0, "model_id");
        assert_eq!(chat[0].1, vec!["GPT-4O (gpt-4o)".to_string()]);
        assert_eq!(chat[1].1, vec!["RAG System (rag-system)".to_string()]);

        let http = options.fields_for(StepKind::HttpRequest);
        assert_eq!(http[0].1, vec!["CRM (crm)".to_string()]);
        assert_eq!(http[1].1, vec!["CRM token (crm-token)".to_string()]);

        assert!(options.fields_for(StepKind::Conditional).is_empty());
    }
}
