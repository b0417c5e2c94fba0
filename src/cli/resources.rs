//! Generic admin resource commands and step editor options

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde_json::Value;

use crate::config::AppConfig;
use crate::domain::admin_api::{AdminApi, AdminResource};
use crate::domain::workflow::StepKind;
use crate::infrastructure::services::{load_step_options, StepOptions};

#[derive(Args, Clone)]
pub struct StepOptionsArgs {
    /// Only show the options used by this step type
    #[arg(long = "type")]
    pub kind: Option<StepKind>,
}

#[derive(Args, Clone)]
pub struct ListArgs {
    /// Resource name, e.g. `workflows`, `test-cases`, `knowledge-bases`
    pub resource: AdminResource,

    /// Print raw JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct ItemArgs {
    pub resource: AdminResource,
    pub id: String,
}

#[derive(Args, Clone)]
pub struct CreateArgs {
    pub resource: AdminResource,

    /// JSON body
    pub file: PathBuf,
}

#[derive(Args, Clone)]
pub struct UpdateArgs {
    pub resource: AdminResource,
    pub id: String,

    /// JSON body
    pub file: PathBuf,
}

#[derive(Args, Clone)]
pub struct ActionArgs {
    pub resource: AdminResource,
    pub id: String,

    /// Action name, e.g. `revoke`, `execute`, `test`
    pub action: String,

    /// JSON body file; `{}` when omitted
    #[arg(long)]
    pub body: Option<PathBuf>,
}

pub async fn step_options_command(config: &AppConfig, args: StepOptionsArgs) -> anyhow::Result<()> {
    let api = super::connect(config)?;

    let options = load_step_options(&api)
        .await
        .context("Failed to load step options")?;

    print!("{}", describe_options(&options, args.kind));
    Ok(())
}

pub async fn list_command(config: &AppConfig, args: ListArgs) -> anyhow::Result<()> {
    let api = super::connect(config)?;

    let items = api.list(args.resource).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No {} found", args.resource);
    }
    for item in &items {
        println!("{}", item_line(item));
    }

    Ok(())
}

pub async fn get_command(config: &AppConfig, args: ItemArgs) -> anyhow::Result<()> {
    let api = super::connect(config)?;

    let item = api.get(args.resource, &args.id).await?;
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

pub async fn create_command(config: &AppConfig, args: CreateArgs) -> anyhow::Result<()> {
    let body = read_json(&args.file)?;
    let api = super::connect(config)?;

    let item = api.create(args.resource, &body).await?;
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

pub async fn update_command(config: &AppConfig, args: UpdateArgs) -> anyhow::Result<()> {
    let body = read_json(&args.file)?;
    let api = super::connect(config)?;

    let item = api.update(args.resource, &args.id, &body).await?;
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

pub async fn delete_command(config: &AppConfig, args: ItemArgs) -> anyhow::Result<()> {
    let api = super::connect(config)?;

    api.delete(args.resource, &args.id).await?;
    println!("✓ Deleted {} '{}'", args.resource, args.id);
    Ok(())
}

pub async fn action_command(config: &AppConfig, args: ActionArgs) -> anyhow::Result<()> {
    let body = match &args.body {
        Some(path) => read_json(path)?,
        None => Value::Object(Default::default()),
    };
    let api = super::connect(config)?;

    let result = api
        .action(args.resource, &args.id, &args.action, &body)
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

/// `id  name` for list output, falling back to compact JSON
fn item_line(item: &Value) -> String {
    let text = |key: &str| item.get(key).and_then(Value::as_str);

    match (text("id"), text("name")) {
        (Some(id), Some(name)) if name != id => format!("{:<30} {}", id, name),
        (Some(id), _) => id.to_string(),
        _ => item.to_string(),
    }
}

fn describe_options(options: &StepOptions, kind: Option<StepKind>) -> String {
    let mut out = String::new();

    let kinds = match kind {
        Some(kind) => vec![kind],
        None => StepKind::ALL.to_vec(),
    };

    for kind in kinds {
        let fields = options.fields_for(kind);
        if fields.is_empty() {
            continue;
        }

        let _ = writeln!(out, "{}:", kind);
        for (field, labels) in fields {
            let _ = writeln!(out, "  {} ({})", field, labels.len());
            for label in labels {
                let _ = writeln!(out, "    {}", label);
            }
        }
    }

    out
}
