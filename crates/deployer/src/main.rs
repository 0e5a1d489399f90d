//! `fpe-deploy`: builds the pseudonymization executable and synthesises its
//! deployment plan.
//!
//! Startup sequence:
//! 1. Parse the command line and load [`Config`] from environment variables.
//! 2. Initialise structured JSON logging on stderr.
//! 3. Run the subcommand: `synth` (default) builds then prints the plan,
//!    `build` only builds, `destroy-dek` deletes the DEK secret.

mod build;
mod config;
mod stack;
mod telemetry;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use fpe_service::aws::{AwsClients, SecretsManagerStore};
use fpe_service::dek::SecretStore;

use crate::build::{BuildArtifact, ContainerBuild, LocalBuild, SystemRunner, ToolchainBuilds};
use crate::config::Config;
use crate::stack::StackPlan;

#[derive(Parser, Debug)]
#[command(name = "fpe-deploy", version, about = "Build and plan the FPE pseudonymization service")]
struct Cli {
    /// Source tree to build (overrides DEPLOY_SOURCE_DIR).
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Artifact output directory (overrides DEPLOY_OUTPUT_DIR).
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the artifact, then print the deployment plan as JSON.
    Synth,
    /// Build and verify the artifact only.
    Build,
    /// Permanently delete the DEK secret. Data encrypted under it becomes
    /// unrecoverable.
    DestroyDek {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cli = Cli::parse();
    let mut cfg = Config::from_env().map_err(|e| {
        eprintln!("ERROR: deployer configuration invalid: {e:#}");
        e
    })?;
    if let Some(dir) = cli.source_dir {
        cfg.deploy_source_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        cfg.deploy_output_dir = dir;
    }

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;

    // -----------------------------------------------------------------------
    // 3. Command
    // -----------------------------------------------------------------------
    match cli.command.unwrap_or(Command::Synth) {
        Command::Synth => {
            let artifact = build_artifact(&cfg).await?;
            let plan = StackPlan::synthesize(&cfg.stack_settings(), &artifact);
            println!("{}", plan.to_json().context("failed to serialise deployment plan")?);
        }
        Command::Build => {
            let artifact = build_artifact(&cfg).await?;
            println!("{}", artifact.path().display());
        }
        Command::DestroyDek { yes } => destroy_dek(&cfg, yes).await?,
    }
    Ok(())
}

/// Run the orchestrated build on a blocking thread.
async fn build_artifact(cfg: &Config) -> Result<BuildArtifact> {
    let runner = Arc::new(SystemRunner);
    let strategy = ToolchainBuilds {
        local: LocalBuild::new(runner.clone(), cfg.recipe()),
        container: ContainerBuild::new(
            runner,
            cfg.recipe(),
            cfg.deploy_container_runtime.clone(),
            cfg.build_image(),
        )
        .with_cache_mounts(cfg.recipe().cache_mounts(cfg.cargo_cache_dir().as_deref())),
    };
    let request = cfg.build_request();
    info!(
        source = %request.source_dir.display(),
        artifact = %request.artifact_path().display(),
        toolchain = ?cfg.toolchain,
        "building artifact"
    );

    let artifact = tokio::task::spawn_blocking(move || build::orchestrate(&strategy, &request))
        .await
        .context("build task panicked")??;
    Ok(artifact)
}

async fn destroy_dek(cfg: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        anyhow::bail!(
            "refusing to delete {} without --yes; ciphertext under this DEK becomes unrecoverable",
            cfg.deploy_dek_secret_name
        );
    }
    let clients = AwsClients::init().await;
    let store = SecretsManagerStore::new(clients.secretsmanager);
    let deleted = store
        .delete(&cfg.deploy_dek_secret_name)
        .await
        .with_context(|| format!("failed to delete {}", cfg.deploy_dek_secret_name))?;
    if deleted {
        info!(secret = %cfg.deploy_dek_secret_name, "DEK secret deleted");
    } else {
        warn!(secret = %cfg.deploy_dek_secret_name, "DEK secret did not exist");
    }
    Ok(())
}
