//! CLI module for the PMP admin console
//!
//! Provides subcommands for authoring workflows and driving the gateway's admin API:
//! - `validate`, `references`, `add-step`, `push`: workflow documents
//! - `step-options`: dropdown data for the step editor
//! - `ingest`: knowledge base uploads with status polling
//! - `list`, `get`, `create`, `update`, `delete`, `action`: any admin resource

pub mod ingest;
pub mod resources;
pub mod workflow;

use std::path::Path;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::domain::workflow::WorkflowDraft;
use crate::infrastructure::api_client::HttpAdminApi;
use crate::infrastructure::logging;

/// PMP Admin Console - workflow authoring and administration for the LLM gateway
#[derive(Parser)]
#[command(name = "pmp-admin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection overrides shared by every command
#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// Admin API base URL (overrides config)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// API key sent as a bearer token (overrides config)
    #[arg(long, global = true)]
    pub api_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a workflow document and show reference warnings
    Validate(workflow::ValidateArgs),

    /// Show the references available to a step position
    References(workflow::ReferencesArgs),

    /// Add a step to a workflow document, or replace one
    AddStep(workflow::AddStepArgs),

    /// Validate a workflow document and save it through the admin API
    Push(workflow::PushArgs),

    /// Load the dropdown options offered by the step editor
    StepOptions(resources::StepOptionsArgs),

    /// Upload files into a knowledge base
    Ingest(ingest::IngestArgs),

    /// List an admin resource
    List(resources::ListArgs),

    /// Fetch one item of an admin resource
    Get(resources::ItemArgs),

    /// Create an item from a JSON file
    Create(resources::CreateArgs),

    /// Replace an item from a JSON file
    Update(resources::UpdateArgs),

    /// Delete an item
    Delete(resources::ItemArgs),

    /// Run a named action on an item
    Action(resources::ActionArgs),
}

/// Load configuration, apply command-line overrides and start logging
pub fn init(global: &GlobalArgs) -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()
        .unwrap_or_default()
        .with_overrides(global.base_url.clone(), global.api_key.clone());

    logging::init_logging(&config.logging);

    config
}

pub fn connect(config: &AppConfig) -> anyhow::Result<HttpAdminApi> {
    Ok(HttpAdminApi::new(&config.api)?)
}

/// Read a workflow document from disk
pub fn read_draft(path: &Path, update: bool) -> anyhow::Result<WorkflowDraft> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(WorkflowDraft::from_json(&text, update)?)
}
