//! Build orchestration: produce a tested, verified executable artifact.
//!
//! The local toolchain is tried first. When its probe fails the build falls
//! back to a pinned container image running the same test-then-build
//! sequence. Test and compile failures carry the captured streams verbatim.

pub mod recipe;
pub mod runner;

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use tracing::{info, warn};

pub use recipe::{ArtifactName, Recipe, Toolchain};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};

/// Container mount point of the source tree.
pub const CONTAINER_INPUT: &str = "/asset-input";
/// Container mount point of the output directory.
pub const CONTAINER_OUTPUT: &str = "/asset-output";

/// A command that ran and exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCommand {
    pub command: String,
    pub output: CommandOutput,
}

impl fmt::Display for FailedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.output.status {
            Some(code) => code.to_string(),
            None => "signal".to_owned(),
        };
        write!(
            f,
            "`{}` [Status {status}] stdout: {}\n\n\nstderr: {}",
            self.command, self.output.stdout, self.output.stderr
        )
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no build toolchain available: {0}")]
    ToolchainUnavailable(String),

    #[error("test suite failed: {0}")]
    TestFailure(FailedCommand),

    #[error("build failed: {0}")]
    BuildFailure(FailedCommand),

    /// The build reported success but the expected file is absent.
    #[error("build exited successfully but produced no artifact at {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("{action}: {source}")]
    Io {
        action: String,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    fn io(action: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let action = action.into();
        move |source| BuildError::Io { action, source }
    }
}

/// What to build and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub artifact: ArtifactName,
}

impl BuildRequest {
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(self.artifact.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPath {
    Local,
    Container,
}

/// An executable known to exist on disk after a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    path: PathBuf,
    name: ArtifactName,
    via: BuildPath,
}

impl BuildArtifact {
    pub(crate) fn verified(
        path: PathBuf,
        name: ArtifactName,
        via: BuildPath,
    ) -> Result<Self, BuildError> {
        if path.is_file() {
            Ok(Self { path, name, via })
        } else {
            Err(BuildError::ArtifactMissing(path))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> ArtifactName {
        self.name
    }

    pub fn via(&self) -> BuildPath {
        self.via
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOutcome {
    Built,
    /// The probe failed; not an error, the caller falls back.
    ToolchainAbsent,
}

/// The two ways of producing an artifact, selected by [`orchestrate`].
#[cfg_attr(test, mockall::automock)]
pub trait BuildStrategy: Send + Sync {
    fn try_local_build(&self, request: &BuildRequest) -> Result<LocalOutcome, BuildError>;
    fn container_build(&self, request: &BuildRequest) -> Result<(), BuildError>;
}

fn run_checked(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    on_failure: fn(FailedCommand) -> BuildError,
) -> Result<(), BuildError> {
    let output = runner
        .run(spec)
        .map_err(BuildError::io(format!("failed to start `{spec}`")))?;
    if output.success() {
        Ok(())
    } else {
        Err(on_failure(FailedCommand {
            command: spec.shell_line(),
            output,
        }))
    }
}

// ---------------------------------------------------------------------------
// Local toolchain
// ---------------------------------------------------------------------------

pub struct LocalBuild {
    runner: Arc<dyn CommandRunner>,
    recipe: Recipe,
}

impl LocalBuild {
    pub fn new(runner: Arc<dyn CommandRunner>, recipe: Recipe) -> Self {
        Self { runner, recipe }
    }

    pub fn run(&self, request: &BuildRequest) -> Result<LocalOutcome, BuildError> {
        let probe = self.recipe.probe();
        match self.runner.run(&probe) {
            Ok(out) if out.success() => {
                info!(toolchain = ?self.recipe.toolchain, version = %out.stdout.trim(), "local toolchain found");
            }
            Ok(out) => {
                info!(command = %probe, status = ?out.status, "toolchain probe failed");
                return Ok(LocalOutcome::ToolchainAbsent);
            }
            Err(e) => {
                info!(command = %probe, error = %e, "toolchain probe failed");
                return Ok(LocalOutcome::ToolchainAbsent);
            }
        }

        let source = &request.source_dir;
        let artifact = request.artifact_path();
        run_checked(
            self.runner.as_ref(),
            &self.recipe.test(source),
            BuildError::TestFailure,
        )?;
        run_checked(
            self.runner.as_ref(),
            &self.recipe.build(source, &artifact),
            BuildError::BuildFailure,
        )?;

        if let Some(compiled) = self.recipe.compiled_binary() {
            let compiled = source.join(compiled);
            if !compiled.is_file() {
                return Err(BuildError::ArtifactMissing(compiled));
            }
            fs::copy(&compiled, &artifact).map_err(BuildError::io(format!(
                "failed to copy {} to {}",
                compiled.display(),
                artifact.display()
            )))?;
        }
        Ok(LocalOutcome::Built)
    }
}

// ---------------------------------------------------------------------------
// Container fallback
// ---------------------------------------------------------------------------

/// Builds inside a pinned image. The image starts with an empty crate
/// registry, so cargo runs here are allowed to fetch, still `--locked`.
pub struct ContainerBuild {
    runner: Arc<dyn CommandRunner>,
    recipe: Recipe,
    runtime: String,
    image: String,
    cache_mounts: Vec<(PathBuf, String)>,
}

impl ContainerBuild {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        recipe: Recipe,
        runtime: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            recipe: recipe.networked(),
            runtime: runtime.into(),
            image: image.into(),
            cache_mounts: Vec::new(),
        }
    }

    /// Share host dependency caches, see [`Recipe::cache_mounts`].
    pub fn with_cache_mounts(mut self, mounts: Vec<(PathBuf, String)>) -> Self {
        self.cache_mounts = mounts;
        self
    }

    fn containerized(
        &self,
        source: &Path,
        output: &Path,
        env: Vec<(String, String)>,
        script: String,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(self.runtime.as_str())
            .args(["run", "--rm", "-v"])
            .arg(format!("{}:{CONTAINER_INPUT}", source.display()))
            .arg("-v")
            .arg(format!("{}:{CONTAINER_OUTPUT}", output.display()));
        for (host, inner) in &self.cache_mounts {
            spec = spec.arg("-v").arg(format!("{}:{inner}", host.display()));
        }
        spec = spec.args(["-w", CONTAINER_INPUT]);
        for (k, v) in env {
            spec = spec.arg("-e").arg(format!("{k}={v}"));
        }
        spec.arg(self.image.as_str()).args(["sh", "-c"]).arg(script)
    }

    pub fn run(&self, request: &BuildRequest) -> Result<(), BuildError> {
        let probe = CommandSpec::new(self.runtime.as_str()).arg("--version");
        match self.runner.run(&probe) {
            Ok(out) if out.success() => {}
            Ok(out) => {
                return Err(BuildError::ToolchainUnavailable(format!(
                    "local {:?} toolchain absent and `{probe}` exited with {:?}",
                    self.recipe.toolchain, out.status
                )))
            }
            Err(e) => {
                return Err(BuildError::ToolchainUnavailable(format!(
                    "local {:?} toolchain absent and container runtime `{}` unusable: {e}",
                    self.recipe.toolchain, self.runtime
                )))
            }
        }

        let source = fs::canonicalize(&request.source_dir).map_err(BuildError::io(format!(
            "failed to resolve {}",
            request.source_dir.display()
        )))?;
        let output = fs::canonicalize(&request.output_dir).map_err(BuildError::io(format!(
            "failed to resolve {}",
            request.output_dir.display()
        )))?;
        let inner_source = Path::new(CONTAINER_INPUT);
        let inner_artifact = Path::new(CONTAINER_OUTPUT).join(request.artifact.as_str());

        info!(image = %self.image, runtime = %self.runtime, "building in container");
        let test = self.recipe.test(inner_source).shell_line();
        run_checked(
            self.runner.as_ref(),
            &self.containerized(&source, &output, self.recipe.test_env(), test),
            BuildError::TestFailure,
        )?;
        let build = self.recipe.container_build_line(inner_source, &inner_artifact);
        run_checked(
            self.runner.as_ref(),
            &self.containerized(&source, &output, self.recipe.build_env(), build),
            BuildError::BuildFailure,
        )
    }
}

/// Local toolchain first, container image second.
pub struct ToolchainBuilds {
    pub local: LocalBuild,
    pub container: ContainerBuild,
}

impl BuildStrategy for ToolchainBuilds {
    fn try_local_build(&self, request: &BuildRequest) -> Result<LocalOutcome, BuildError> {
        self.local.run(request)
    }

    fn container_build(&self, request: &BuildRequest) -> Result<(), BuildError> {
        self.container.run(request)
    }
}

/// Produce the artifact for `request`, or fail without leaving one behind.
///
/// Blocking; callers on an async runtime should use `spawn_blocking`.
pub fn orchestrate(
    strategy: &dyn BuildStrategy,
    request: &BuildRequest,
) -> Result<BuildArtifact, BuildError> {
    fs::create_dir_all(&request.output_dir).map_err(BuildError::io(format!(
        "failed to create {}",
        request.output_dir.display()
    )))?;
    let artifact = request.artifact_path();
    remove_artifact(&artifact)?;

    let result = match strategy.try_local_build(request) {
        Ok(LocalOutcome::Built) => Ok(BuildPath::Local),
        Ok(LocalOutcome::ToolchainAbsent) => {
            info!("local toolchain absent, falling back to container build");
            strategy
                .container_build(request)
                .map(|()| BuildPath::Container)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(via) => {
            let built = BuildArtifact::verified(artifact, request.artifact, via)?;
            info!(path = %built.path().display(), via = ?built.via(), "artifact ready");
            Ok(built)
        }
        Err(e) => {
            if let Err(cleanup) = remove_artifact(&artifact) {
                warn!(error = %cleanup, "failed to remove partial artifact");
            }
            Err(e)
        }
    }
}

fn remove_artifact(path: &Path) -> Result<(), BuildError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::Io {
            action: format!("failed to remove {}", path.display()),
            source: e,
        }),
    }
}
