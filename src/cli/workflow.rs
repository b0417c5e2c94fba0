//! Workflow document commands

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::admin_api::AdminApi;
use crate::domain::knowledge_base::{FilterConnector, FilterOperator, FilterRow};
use crate::domain::workflow::{
    available_references, lint_references, render_summary, validate, AuthoringSession,
    AvailableReferences, SaveOutcome, StepForm, StepKind, WorkflowDraft, WorkflowError,
    WorkflowStepType,
};

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Workflow document (JSON)
    pub file: PathBuf,

    /// Treat the document as an update of an existing workflow
    #[arg(long)]
    pub update: bool,

    /// Print the assembled payload instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct ReferencesArgs {
    /// Workflow document (JSON)
    pub file: PathBuf,

    /// Step position (0-based); defaults to after the last step
    #[arg(long)]
    pub step: Option<usize>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct AddStepArgs {
    /// Workflow document (JSON)
    pub file: PathBuf,

    /// Step type of a new step
    #[arg(long = "type", required_unless_present = "index")]
    pub kind: Option<StepKind>,

    /// Replace the step at this position instead of appending
    #[arg(long)]
    pub index: Option<usize>,

    /// Form field, e.g. `--set name=search --set top_k=3`
    #[arg(long = "set", value_parser = parse_assignment)]
    pub fields: Vec<(String, String)>,

    /// Prompt template scanned for `${var:..}` variables
    #[arg(long)]
    pub prompt_content: Option<String>,

    /// Prompt variable value, e.g. `--var context=${step:search:documents}`
    #[arg(long = "var", value_parser = parse_assignment)]
    pub variables: Vec<(String, String)>,

    /// Metadata filter row `key:operator:value`
    #[arg(long = "filter", value_parser = parse_filter_row)]
    pub filters: Vec<FilterRow>,

    /// How filter rows combine
    #[arg(long)]
    pub connector: Option<FilterConnector>,

    /// Write the result back to the file instead of printing it
    #[arg(long)]
    pub write: bool,
}

#[derive(Args, Clone)]
pub struct PushArgs {
    /// Workflow document (JSON)
    pub file: PathBuf,

    /// Replace the stored workflow with the document's id
    #[arg(long)]
    pub update: bool,
}

pub fn validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let draft = super::read_draft(&args.file, args.update)?;

    let payload = validate(&draft).context("Workflow is not valid")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    print!("{}", describe_steps(&draft));

    let warnings = lint_references(&draft.steps, draft.parsed_input_schema().as_ref());
    for warning in &warnings {
        println!("warning: {}", warning);
    }

    println!(
        "✓ Workflow '{}' is valid ({} steps, {} warnings)",
        payload.name,
        payload.steps.len(),
        warnings.len()
    );

    Ok(())
}

pub fn references_command(args: ReferencesArgs) -> anyhow::Result<()> {
    let draft = super::read_draft(&args.file, false)?;
    let position = args.step.unwrap_or(draft.steps.len());

    if position > draft.steps.len() {
        return Err(WorkflowError::StepIndexOutOfRange(position).into());
    }

    let references = available_references(
        &draft.steps,
        position,
        draft.parsed_input_schema().as_ref(),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&references)?);
    } else {
        print!("{}", describe_references(&references));
    }

    Ok(())
}

pub async fn add_step_command(config: &AppConfig, args: AddStepArgs) -> anyhow::Result<()> {
    let draft = super::read_draft(&args.file, false)?;
    let mut session = AuthoringSession::from_draft(draft);

    let mut form = match args.index {
        Some(index) => session.edit_step(index)?,
        None => {
            let kind = args.kind.context("--type is required for a new step")?;
            session.begin_step(kind);
            StepForm::new()
        }
    };

    for (key, value) in &args.fields {
        form.set_field(key, value);
    }

    for (name, value) in &args.variables {
        form = form.with_prompt_variable(name, value);
    }

    let prompt_content = match args.prompt_content {
        Some(content) => Some(content),
        None if !args.variables.is_empty() => fetch_prompt_content(config, &form).await?,
        None => None,
    };
    if let Some(content) = prompt_content {
        form = form.with_prompt_content(content);
    }

    if let Some(connector) = args.connector {
        form = form.with_filter_connector(connector);
    }
    for row in args.filters {
        form = form.with_filter_row(row);
    }

    let position = session.commit_step(&form)?;
    let document = serde_json::to_string_pretty(&session.draft().to_document()?)?;

    if args.write {
        std::fs::write(&args.file, format!("{}\n", document))
            .with_context(|| format!("Failed to write {}", args.file.display()))?;
        info!(position = position, file = %args.file.display(), "Step stored");
        println!("✓ Stored step {} in {}", position, args.file.display());
    } else {
        println!("{}", document);
    }

    Ok(())
}

/// Prompt variables are only kept when the prompt declares them, so the template is needed
async fn fetch_prompt_content(config: &AppConfig, form: &StepForm) -> anyhow::Result<Option<String>> {
    let Some(prompt_id) = form.field("prompt_id").map(str::trim).filter(|id| !id.is_empty())
    else {
        return Ok(None);
    };

    let api = super::connect(config)?;

    let prompt = api
        .list_prompts()
        .await?
        .into_iter()
        .find(|p| p.id == prompt_id)
        .with_context(|| format!("Prompt '{}' not found", prompt_id))?;

    Ok(Some(prompt.content))
}

pub async fn push_command(config: &AppConfig, args: PushArgs) -> anyhow::Result<()> {
    let draft = super::read_draft(&args.file, args.update)?;
    let api = super::connect(config)?;

    let mut session = AuthoringSession::from_draft(draft);

    for warning in session.lint() {
        println!("warning: {}", warning);
    }

    match session.save(&api).await? {
        SaveOutcome::Persisted(workflow) => {
            println!(
                "✓ Saved workflow '{}' ({}) version {}",
                workflow.name(),
                workflow.id(),
                workflow.version()
            );
            Ok(())
        }
        SaveOutcome::ValidationFailed(e) => bail!("Workflow is not valid: {}", e),
    }
}

/// Step list with conditional summaries
pub fn describe_steps(draft: &WorkflowDraft) -> String {
    let mut out = String::new();

    for (i, step) in draft.steps.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} [{}] on_error={}",
            i + 1,
            step.name(),
            StepKind::of(step.step_type()),
            step.on_error().as_str()
        );

        if let WorkflowStepType::Conditional(cond) = step.step_type() {
            for line in render_summary(&cond.conditions).to_string().lines() {
                let _ = writeln!(out, "     {}", line);
            }
        }
    }

    out
}

pub fn describe_references(references: &AvailableReferences) -> String {
    let mut out = String::new();

    if references.is_empty() {
        out.push_str("No references available\n");
        return out;
    }

    if !references.request_fields.is_empty() {
        out.push_str("Request fields:\n");
        for field in &references.request_fields {
            let _ = write!(out, "  {} ({})", field.syntax, field.field_type);
            if !field.description.is_empty() {
                let _ = write!(out, " - {}", field.description);
            }
            out.push('\n');
        }
    }

    for step in &references.step_outputs {
        let _ = writeln!(out, "Step '{}' [{}]:", step.step_name, step.step_type);
        for output in &step.outputs {
            let _ = writeln!(out, "  {} - {}", output.syntax, output.description);
        }
    }

    out
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }

    Ok((key.to_string(), value.to_string()))
}

fn parse_filter_row(raw: &str) -> Result<FilterRow, String> {
    let mut parts = raw.splitn(3, ':');
    let key = parts.next().unwrap_or_default().trim();
    let operator = parts
        .next()
        .ok_or_else(|| format!("expected key:operator[:value], got '{}'", raw))?;
    let value = parts.next().unwrap_or_default();

    let operator: FilterOperator = operator.trim().parse().map_err(|e| format!("{}", e))?;

    Ok(FilterRow::new(key, operator, value))
}
