//! Per-toolchain command presets.
//!
//! Every preset resolves dependencies from a vendored or locked set and pins
//! the target to `linux/amd64` with no native bridging, so the artifact runs
//! in the execution environment whatever the build host is. Local cargo runs
//! stay offline against the host registry; container runs may fetch.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::runner::CommandSpec;

/// Rust target of the cargo preset.
pub const CARGO_TARGET: &str = "x86_64-unknown-linux-musl";

/// Flags for [`CARGO_TARGET`] only. A bare `RUSTFLAGS` would also reach
/// host-compiled proc-macros, which cannot link statically.
const CARGO_TARGET_RUSTFLAGS: (&str, &str) = (
    "CARGO_TARGET_X86_64_UNKNOWN_LINUX_MUSL_RUSTFLAGS",
    "-C target-feature=+crt-static",
);

/// `$CARGO_HOME` inside the official rust images.
pub const CONTAINER_CARGO_HOME: &str = "/usr/local/cargo";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toolchain {
    #[default]
    Cargo,
    Go,
}

impl Toolchain {
    /// Pinned build image used when the toolchain is not installed locally.
    pub fn default_image(self) -> &'static str {
        match self {
            Toolchain::Cargo => "docker.io/library/rust:1.79-alpine3.20",
            Toolchain::Go => "public.ecr.aws/sam/build-go1.x:1.2.0",
        }
    }
}

/// Entry-point file name. Only one convention is active per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactName {
    /// Provided-runtime convention.
    #[default]
    Bootstrap,
    /// Legacy convention.
    Main,
}

impl ArtifactName {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactName::Bootstrap => "bootstrap",
            ArtifactName::Main => "main",
        }
    }
}

/// How to probe, test and build one source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub toolchain: Toolchain,
    /// Cargo binary target name; unused by the go preset.
    pub binary: String,
    /// Pass `--offline` to cargo. Go always builds from `vendor/`.
    pub offline: bool,
}

impl Recipe {
    pub fn new(toolchain: Toolchain, binary: impl Into<String>) -> Self {
        Self {
            toolchain,
            binary: binary.into(),
            offline: true,
        }
    }

    /// Same preset, allowed to fetch crates missing from the registry cache.
    /// `--locked` still pins every version to `Cargo.lock`.
    pub fn networked(mut self) -> Self {
        self.offline = false;
        self
    }

    fn cargo(&self, leading: [&str; 2]) -> CommandSpec {
        CommandSpec::new("cargo")
            .args(leading)
            .arg("--locked")
            .args(self.offline.then_some("--offline"))
    }

    /// Version check that fails when the toolchain is not installed.
    pub fn probe(&self) -> CommandSpec {
        match self.toolchain {
            Toolchain::Cargo => CommandSpec::new("cargo").arg("--version"),
            Toolchain::Go => CommandSpec::new("go").arg("version"),
        }
    }

    /// Environment of the test step. Cargo tests run on the host target.
    pub fn test_env(&self) -> Vec<(String, String)> {
        match self.toolchain {
            Toolchain::Cargo => Vec::new(),
            Toolchain::Go => self.build_env(),
        }
    }

    /// Environment of the build step.
    pub fn build_env(&self) -> Vec<(String, String)> {
        let pairs: &[(&str, &str)] = match self.toolchain {
            Toolchain::Cargo => &[CARGO_TARGET_RUSTFLAGS],
            Toolchain::Go => &[("CGO_ENABLED", "0"), ("GOOS", "linux"), ("GOARCH", "amd64")],
        };
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    pub fn test(&self, source: &Path) -> CommandSpec {
        let spec = match self.toolchain {
            Toolchain::Cargo => self.cargo(["test", "--verbose"]),
            Toolchain::Go => CommandSpec::new("go").args(["test", "-v"]),
        };
        spec.current_dir(source).envs(self.test_env())
    }

    /// Compile into `artifact`. The cargo preset compiles into its target
    /// directory; see [`Recipe::compiled_binary`].
    pub fn build(&self, source: &Path, artifact: &Path) -> CommandSpec {
        let spec = match self.toolchain {
            Toolchain::Cargo => self.cargo(["build", "--release"]).args([
                "--target",
                CARGO_TARGET,
                "--bin",
                self.binary.as_str(),
            ]),
            Toolchain::Go => CommandSpec::new("go")
                .args(["build", "-mod=vendor", "-o"])
                .arg(artifact.to_string_lossy()),
        };
        spec.current_dir(source).envs(self.build_env())
    }

    /// Host cache directories to share with a build container, as
    /// `(host, container)` pairs. Only directories that exist are returned.
    pub fn cache_mounts(&self, cargo_home: Option<&Path>) -> Vec<(PathBuf, String)> {
        let (Toolchain::Cargo, Some(home)) = (self.toolchain, cargo_home) else {
            return Vec::new();
        };
        ["registry", "git"]
            .into_iter()
            .map(|sub| (home.join(sub), format!("{CONTAINER_CARGO_HOME}/{sub}")))
            .filter(|(host, _)| host.is_dir())
            .collect()
    }

    /// Where the compiler leaves the binary, relative to the source tree,
    /// when it cannot write to the artifact path directly.
    pub fn compiled_binary(&self) -> Option<PathBuf> {
        match self.toolchain {
            Toolchain::Cargo => Some(
                Path::new("target")
                    .join(CARGO_TARGET)
                    .join("release")
                    .join(&self.binary),
            ),
            Toolchain::Go => None,
        }
    }

    /// Shell line run inside the build container to produce `artifact`.
    pub fn container_build_line(&self, source: &Path, artifact: &Path) -> String {
        let build = self.build(source, artifact).shell_line();
        match self.compiled_binary() {
            Some(compiled) => format!("{build} && cp {} {}", compiled.display(), artifact.display()),
            None => build,
        }
    }
}
