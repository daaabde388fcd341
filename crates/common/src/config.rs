//! Run configuration
//!
//! [`RunOptions`] is the caller-facing, loosely-typed option set (config file
//! plus CLI flags). [`RunConfiguration`] is the validated, immutable record
//! one run is driven by. A fresh configuration is built for every run, so
//! nothing accumulates between invocations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Port the ephemeral server binds when none is configured
pub const DEFAULT_PORT: u16 = 8888;

/// Jasmine version used when none is configured
pub const DEFAULT_JASMINE_VERSION: &str = "2.0";

/// Headless browser executable name
pub const DEFAULT_BROWSER: &str = "phantomjs";

/// Directory holding `jasmine-<version>/` asset folders
pub const DEFAULT_FRAMEWORK_ROOT: &str = "vendor";

/// File name of a generated harness document
pub const HARNESS_FILE_NAME: &str = "specRunner.html";

/// Caller-facing options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// Jasmine version selector (`jasmine-<version>` asset folder)
    pub jasmine_version: Option<String>,

    /// Extra server roots, searched after the working directory
    pub server_roots: Vec<PathBuf>,

    /// Listener port
    pub port: Option<u16>,

    /// Vendor scripts: paths, glob patterns or URLs
    pub vendor: Option<VendorSpec>,

    /// RequireJS configuration made available to the page
    pub require_config: Option<Value>,

    /// RequireJS source to inline into the harness
    pub require_js: Option<PathBuf>,

    /// Runner script handed to the browser (default: embedded runner)
    pub runner: Option<PathBuf>,

    /// Pre-built harness document; skips generation
    pub spec_html: Option<PathBuf>,

    /// Keep the generated harness document
    pub keep_runner: KeepRunner,

    /// Report spec failures through the exit code
    pub abort_on_fail: bool,

    /// Serve the harness without launching a browser
    pub just_server: bool,

    /// Browser executable name (default: phantomjs)
    pub browser: Option<String>,

    /// Directory holding the Jasmine asset folders
    pub framework_root: Option<PathBuf>,

    /// Extra options passed to the runner script as JSON
    pub runner_options: Map<String, Value>,
}

/// Vendor scripts given as one entry or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VendorSpec {
    One(String),
    Many(Vec<String>),
}

impl VendorSpec {
    pub fn entries(&self) -> &[String] {
        match self {
            VendorSpec::One(entry) => std::slice::from_ref(entry),
            VendorSpec::Many(entries) => entries,
        }
    }
}

/// `keepRunner`: either a flag or the directory to write the harness into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeepRunner {
    Flag(bool),
    Directory(PathBuf),
}

impl Default for KeepRunner {
    fn default() -> Self {
        KeepRunner::Flag(false)
    }
}

impl KeepRunner {
    pub fn is_kept(&self) -> bool {
        !matches!(self, KeepRunner::Flag(false))
    }
}

/// Where the harness document comes from
#[derive(Debug, Clone, PartialEq)]
pub enum HarnessSource {
    /// Generate it; `keep` is the persistent location, `None` = temporary
    Generate { keep: Option<PathBuf> },
    /// Caller-supplied document, served as is and never deleted
    Prebuilt(PathBuf),
}

/// Jasmine asset location
#[derive(Debug, Clone, PartialEq)]
pub struct FrameworkAssets {
    pub root: PathBuf,
    pub version: String,
}

impl FrameworkAssets {
    pub fn dir(&self) -> PathBuf {
        self.root.join(format!("jasmine-{}", self.version))
    }

    pub fn stylesheet(&self) -> PathBuf {
        self.dir().join("jasmine.css")
    }

    /// Bootstrap scripts in load order
    pub fn scripts(&self) -> Vec<PathBuf> {
        let dir = self.dir();
        ["jasmine.js", "jasmine-html.js", "console.js", "boot.js"]
            .iter()
            .map(|name| dir.join(name))
            .collect()
    }

    /// RequireJS loader that pulls in the spec files
    pub fn spec_loader(&self) -> PathBuf {
        self.root.join("specRunner.js")
    }

    pub fn favicon(&self) -> PathBuf {
        self.root.join("jasmine_favicon.png")
    }
}

/// Ordered root directories the server resolves requests against.
///
/// Always starts with the empty root (the working directory); caller roots
/// follow in the order given, duplicates dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRoots(Vec<PathBuf>);

impl ServerRoots {
    pub fn new<I>(roots: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        let mut all = vec![PathBuf::new()];
        for root in roots {
            let root = root.into();
            if !all.contains(&root) {
                all.push(root);
            }
        }
        Self(all)
    }

    /// Resolve every root against `base`, keeping the order
    pub fn anchored(&self, base: &Path) -> Self {
        Self(self.0.iter().map(|root| base.join(root)).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ServerRoots {
    fn default() -> Self {
        Self::new(Vec::<PathBuf>::new())
    }
}

/// Immutable per-run configuration
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    /// Working directory local paths are made relative to
    pub cwd: PathBuf,
    pub roots: ServerRoots,
    pub port: u16,
    pub harness: HarnessSource,
    /// Runner script; `None` uses the embedded runner
    pub runner: Option<PathBuf>,
    pub browser: String,
    pub abort_on_fail: bool,
    pub runner_options: Map<String, Value>,
    pub serve_only: bool,
    pub framework: FrameworkAssets,
    pub vendor: Vec<String>,
    pub require_config: Option<Value>,
    pub require_js: Option<PathBuf>,
}

impl RunOptions {
    /// Load options from a TOML file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let options: Self = toml::from_str(&content)?;
            debug!("Loaded options from {}", path.display());
            Ok(options)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate and freeze into a [`RunConfiguration`] anchored at `cwd`
    pub fn into_configuration(self, cwd: &Path) -> Result<RunConfiguration> {
        let version = self
            .jasmine_version
            .unwrap_or_else(|| DEFAULT_JASMINE_VERSION.to_string());
        if version.is_empty() || version.contains(['/', '\\']) {
            return Err(Error::InvalidConfig(format!(
                "jasmineVersion must be a plain version string, got {:?}",
                version
            )));
        }

        let browser = self.browser.unwrap_or_else(|| DEFAULT_BROWSER.to_string());
        if browser.trim().is_empty() {
            return Err(Error::InvalidConfig("browser must not be empty".to_string()));
        }

        if self.runner_options.contains_key("abortOnFail") {
            return Err(Error::InvalidConfig(
                "runnerOptions must not set abortOnFail; use the abortOnFail option".to_string(),
            ));
        }

        let harness = match self.spec_html {
            Some(path) => HarnessSource::Prebuilt(cwd.join(path)),
            None => HarnessSource::Generate {
                keep: match self.keep_runner {
                    KeepRunner::Flag(false) => None,
                    KeepRunner::Flag(true) => Some(cwd.join(HARNESS_FILE_NAME)),
                    KeepRunner::Directory(dir) => Some(cwd.join(dir).join(HARNESS_FILE_NAME)),
                },
            },
        };

        let framework_root = self
            .framework_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAMEWORK_ROOT));

        Ok(RunConfiguration {
            cwd: cwd.to_path_buf(),
            roots: ServerRoots::new(self.server_roots),
            port: self.port.unwrap_or(DEFAULT_PORT),
            harness,
            runner: self.runner.map(|r| cwd.join(r)),
            browser,
            abort_on_fail: self.abort_on_fail,
            runner_options: self.runner_options,
            serve_only: self.just_server,
            framework: FrameworkAssets {
                root: cwd.join(framework_root),
                version,
            },
            vendor: self
                .vendor
                .map(|v| v.entries().to_vec())
                .unwrap_or_default(),
            require_config: self.require_config,
            require_js: self.require_js.map(|p| cwd.join(p)),
        })
    }
}

impl RunConfiguration {
    /// Third positional argument for the runner script
    pub fn launch_options_json(&self) -> Result<String> {
        let mut options = self.runner_options.clone();
        options.insert("abortOnFail".to_string(), Value::Bool(self.abort_on_fail));
        Ok(serde_json::to_string(&Value::Object(options))?)
    }

    /// Whether the harness document must be removed after the run
    pub fn removes_harness(&self) -> bool {
        matches!(self.harness, HarnessSource::Generate { keep: None })
    }
}
