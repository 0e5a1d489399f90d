//! Configuration loading and validation for the deployer.
//!
//! Values come from `DEPLOY_*` environment variables; CLI flags in `main`
//! override the few that are commonly changed per invocation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use common::Profile;
use serde::Deserialize;

use crate::build::{ArtifactName, BuildRequest, Recipe, Toolchain};
use crate::stack::StackSettings;

/// Validated deployer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of the executable's source tree.
    #[serde(default = "default_source_dir")]
    pub deploy_source_dir: PathBuf,

    /// Directory receiving the artifact.
    #[serde(default = "default_output_dir")]
    pub deploy_output_dir: PathBuf,

    #[serde(default, rename = "deploy_profile")]
    pub profile: Profile,

    #[serde(default, rename = "deploy_toolchain")]
    pub toolchain: Toolchain,

    /// `bootstrap` (provided runtime) or `main` (legacy).
    #[serde(default, rename = "deploy_artifact_name")]
    pub artifact: ArtifactName,

    /// Cargo binary target to build.
    #[serde(default = "default_binary_name")]
    pub deploy_binary_name: String,

    /// Build image for the container fallback. Defaults per toolchain.
    #[serde(default)]
    pub deploy_build_image: Option<String>,

    #[serde(default = "default_container_runtime")]
    pub deploy_container_runtime: String,

    /// Hex-encoded FF1 tweak passed to the function.
    #[serde(default = "default_tweak")]
    pub deploy_tweak: String,

    #[serde(default = "default_dek_secret_name")]
    pub deploy_dek_secret_name: String,

    #[serde(default = "default_stack_name")]
    pub deploy_stack_name: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `$CARGO_HOME`; its registry is shared with the build container.
    #[serde(default)]
    pub cargo_home: Option<PathBuf>,

    /// `$HOME`, for the default `~/.cargo`.
    #[serde(default)]
    pub home: Option<PathBuf>,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("target/asset")
}
fn default_binary_name() -> String {
    "fpe-service".into()
}
fn default_container_runtime() -> String {
    "docker".into()
}
fn default_tweak() -> String {
    "D8E7920AFA330A73".into()
}
fn default_dek_secret_name() -> String {
    "/secret/fpe/dek".into()
}
fn default_stack_name() -> String {
    "FpePseudonymizationStack".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build deployer configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise deployer configuration")?;

        c.validate()?;
        Ok(c)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let tweak = hex::decode(&self.deploy_tweak).context("DEPLOY_TWEAK must be hex")?;
        if tweak.is_empty() {
            anyhow::bail!("DEPLOY_TWEAK must not be empty");
        }
        if self.deploy_binary_name.trim().is_empty() {
            anyhow::bail!("DEPLOY_BINARY_NAME must not be empty");
        }
        if self.deploy_container_runtime.trim().is_empty() {
            anyhow::bail!("DEPLOY_CONTAINER_RUNTIME must not be empty");
        }
        if self.deploy_dek_secret_name.trim().is_empty() {
            anyhow::bail!("DEPLOY_DEK_SECRET_NAME must not be empty");
        }
        Ok(())
    }

    pub fn recipe(&self) -> Recipe {
        Recipe::new(self.toolchain, self.deploy_binary_name.clone())
    }

    pub fn build_image(&self) -> String {
        self.deploy_build_image
            .clone()
            .unwrap_or_else(|| self.toolchain.default_image().to_owned())
    }

    pub fn cargo_cache_dir(&self) -> Option<PathBuf> {
        self.cargo_home
            .clone()
            .or_else(|| self.home.as_ref().map(|h| h.join(".cargo")))
    }

    pub fn build_request(&self) -> BuildRequest {
        BuildRequest {
            source_dir: self.deploy_source_dir.clone(),
            output_dir: self.deploy_output_dir.clone(),
            artifact: self.artifact,
        }
    }

    pub fn stack_settings(&self) -> StackSettings {
        StackSettings {
            stack_name: self.deploy_stack_name.clone(),
            profile: self.profile,
            tweak: self.deploy_tweak.clone(),
            dek_secret_name: self.deploy_dek_secret_name.clone(),
        }
    }
}
