//! Runtime configuration, read fresh on every call.
//!
//! Operations and the path sandbox never touch `std::env` directly; they go
//! through a [`ConfigProvider`] so tests can inject an explicit override set.
//! Values are re-read on each call, so two concurrent calls may observe
//! different policy if the operator changes the environment mid-flight.

use std::collections::HashMap;
use std::path::PathBuf;

/// Byte ceiling applied when nothing else is configured.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 2_000_000;

pub const MAX_FILE_BYTES_ENV: &str = "SKY_MCP_MAX_FILE_BYTES";
pub const ALLOWED_ROOTS_ENV: &str = "SKY_MCP_ALLOWED_ROOTS";
pub const ASSETS_DIR_ENV: &str = "SKY_ASSETS_DIR";
pub const MP_API_KEY_ENV: &str = "MP_API_KEY";
/// Checked in order; the first non-empty one wins.
pub const OPENAI_KEY_ENVS: [&str; 2] = ["OPENAI_MDG_API_KEY", "OPENAI_API_KEY"];
pub const MP_API_ENDPOINT_ENV: &str = "MP_API_ENDPOINT";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const LLM_MODEL_ENV: &str = "SKY_LLM_MODEL";

pub const DEFAULT_MP_API_ENDPOINT: &str = "https://api.materialsproject.org";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Directory (under the working directory) that receives generated reports.
pub const REPORTS_DIR_NAME: &str = "sky_reports";

#[cfg(windows)]
const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: char = ':';

/// Source of process-wide settings.
pub trait ConfigProvider: Send + Sync {
    /// Raw variable lookup. Empty values count as absent.
    fn var(&self, key: &str) -> Option<String>;

    /// Working directory of the gateway process.
    fn current_dir(&self) -> PathBuf;

    /// Fixed repository root, always admissible for local reads.
    fn repo_root(&self) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    }

    fn assets_dir(&self) -> PathBuf {
        self.var(ASSETS_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.repo_root().join("assets"))
    }

    fn max_file_bytes(&self) -> u64 {
        parse_max_bytes(self.var(MAX_FILE_BYTES_ENV).as_deref())
    }

    fn extra_allowed_roots(&self) -> Vec<PathBuf> {
        self.var(ALLOWED_ROOTS_ENV)
            .map(|raw| split_path_list(&raw))
            .unwrap_or_default()
    }

    /// Repository root, asset root, working directory, then any extra roots.
    fn default_allowed_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.repo_root(), self.assets_dir(), self.current_dir()];
        roots.extend(self.extra_allowed_roots());
        roots
    }

    fn mp_api_key(&self) -> Option<String> {
        self.var(MP_API_KEY_ENV)
    }

    fn openai_api_key(&self) -> Option<String> {
        OPENAI_KEY_ENVS.iter().find_map(|key| self.var(key))
    }

    fn reports_dir(&self) -> PathBuf {
        self.current_dir().join(REPORTS_DIR_NAME)
    }
}

/// Reads the live process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfig;

impl ConfigProvider for EnvConfig {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn current_dir(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

/// Explicit override set, used by tests and embedders.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    vars: HashMap<String, String>,
    cwd: PathBuf,
    repo_root: PathBuf,
}

impl StaticConfig {
    /// Config rooted at `dir` for both the working directory and repo root.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            vars: HashMap::new(),
            cwd: dir.clone(),
            repo_root: dir,
        }
    }

    pub fn with_var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = root.into();
        self
    }
}

impl ConfigProvider for StaticConfig {
    fn var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    fn current_dir(&self) -> PathBuf {
        self.cwd.clone()
    }

    fn repo_root(&self) -> PathBuf {
        self.repo_root.clone()
    }
}

/// Parse the byte ceiling override; anything but a positive integer falls
/// back to [`DEFAULT_MAX_FILE_BYTES`].
pub fn parse_max_bytes(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .map(|v| v as u64)
        .unwrap_or(DEFAULT_MAX_FILE_BYTES)
}

/// Split a path-separator delimited list, dropping blank entries.
pub fn split_path_list(raw: &str) -> Vec<PathBuf> {
    raw.split(PATH_LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}
