//! Listing shapes used to populate the step editor

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub provider_model: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSummary {
    pub id: String,
    pub name: String,
    /// Template text, scanned for `${var:..}` tokens
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kb_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "provider_type")]
    pub credential_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalApiSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

macro_rules! impl_option_display {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.name.is_empty() || self.name == self.id {
                    f.write_str(&self.id)
                } else {
                    write!(f, "{} ({})", self.name, self.id)
                }
            }
        })*
    };
}

impl_option_display!(
    ModelSummary,
    PromptSummary,
    KnowledgeBaseSummary,
    CredentialSummary,
    ExternalApiSummary
);

/// A file sent to a knowledge base for ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }

    /// Guessed content type from the file extension
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(Path::new(&self.file_name))
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summaries_tolerate_missing_fields() {
        let model: ModelSummary =
            serde_json::from_value(json!({"id": "gpt-4", "name": "GPT-4"})).unwrap();
        assert!(model.enabled);
        assert_eq!(model.to_string(), "GPT-4 (gpt-4)");

        let credential: CredentialSummary =
            serde_json::from_value(json!({"id": "openai", "provider_type": "openai"})).unwrap();
        assert_eq!(credential.credential_type.as_deref(), Some("openai"));
        assert_eq!(credential.to_string(), "openai");
    }

    #[test]
    fn test_upload_mime_type() {
        assert_eq!(UploadFile::new("notes.md", vec![]).mime_type(), "text/markdown");
        assert_eq!(UploadFile::new("report.pdf", vec![]).mime_type(), "application/pdf");
        assert_eq!(
            UploadFile::new("blob", vec![1, 2]).mime_type(),
            "application/octet-stream"
        );
    }
}
