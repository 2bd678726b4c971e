use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use crossgrant_aws::build_components;
use crossgrant_core::{Deprovisioner, ProvisionConfig, Provisioner, generate, telemetry};
use crossgrant_spec::{DataFlow, ProvisionRequest, ProvisionedGrant};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "crossgrant",
    version,
    about = "Temporary cross-account S3 copy grants"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive a provisioning request from a data flow without touching AWS.
    Plan(PlanCmd),
    /// Create the role, policies and credentials for a request.
    Provision(ProvisionCmd),
    /// Remove everything a grant created.
    Deprovision(DeprovisionCmd),
}

#[derive(Args)]
struct PlanCmd {
    /// Data flow JSON with `id`, `source` and `destination`.
    #[arg(long)]
    flow: PathBuf,
}

#[derive(Args)]
struct ProvisionCmd {
    /// Provisioning request JSON, as printed by `plan`.
    #[arg(long)]
    request: PathBuf,
}

#[derive(Args)]
struct DeprovisionCmd {
    /// Grant JSON, as printed by `provision`.
    #[arg(long)]
    grant: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;
    let cli = Cli::parse();
    match cli.command {
        Command::Plan(cmd) => plan(cmd),
        Command::Provision(cmd) => provision(cmd).await,
        Command::Deprovision(cmd) => deprovision(cmd).await,
    }
}

fn plan(cmd: PlanCmd) -> Result<()> {
    let flow: DataFlow = read_json(&cmd.flow)?;
    let Some(request) = generate(&flow) else {
        bail!(
            "flow {} is not an S3 to S3 transfer on a single endpoint",
            flow.id
        );
    };
    write_json(&request)
}

async fn provision(cmd: ProvisionCmd) -> Result<()> {
    let request: ProvisionRequest = read_json(&cmd.request)?;
    let config = ProvisionConfig::from_env()?;
    let aws = build_components().await?;
    let provisioner = Provisioner::new(aws.accessor.clone(), aws.secrets, config);

    let grant = provisioner.provision(&request).await;
    aws.accessor.shutdown().await;
    let grant = grant.with_context(|| format!("provisioning flow {}", request.flow_id))?;
    info!(role = %grant.role.arn, "provisioned");
    write_json(&grant)
}

async fn deprovision(cmd: DeprovisionCmd) -> Result<()> {
    let grant: ProvisionedGrant = read_json(&cmd.grant)?;
    let config = ProvisionConfig::from_env()?;
    let aws = build_components().await?;
    let deprovisioner = Deprovisioner::new(aws.accessor.clone(), aws.secrets, config);

    let outcome = deprovisioner.deprovision(&grant).await;
    aws.accessor.shutdown().await;
    outcome.with_context(|| format!("deprovisioning flow {}", grant.flow_id()))?;
    println!("deprovisioned {}", grant.role.name);
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
