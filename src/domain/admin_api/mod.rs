//! Admin API domain - the backend contract the console talks to

mod api;
mod resource;
mod types;

pub use api::AdminApi;
pub use resource::{extract_list, AdminResource};
pub use types::{
    CredentialSummary, ExternalApiSummary, KnowledgeBaseSummary, ModelSummary, PromptSummary,
    UploadFile,
};

#[cfg(test)]
pub use api::MockAdminApi;
