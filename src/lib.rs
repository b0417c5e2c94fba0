//! PMP Admin Console
//!
//! Authoring and administration client for the PMP LLM Gateway:
//! - Workflow documents built from typed steps, validated before they are sent
//! - Variable reference discovery and linting
//! - Knowledge base metadata filters
//! - Admin API client with ingestion status polling

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
