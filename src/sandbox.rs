//! Allow-list path resolution for operations that read local files.
//!
//! A user-supplied path is expanded (`~`), made absolute against the working
//! directory and normalized (`.`, `..`, symlinks) before containment is
//! checked against every allowed root. Containment is component-wise, so
//! `/data` never admits `/database`.
//!
//! The result is a point-in-time guarantee. No lock is held: the file may
//! change between resolution and the caller's read.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ConfigProvider;
use crate::envelope::ErrorType;

/// A path that passed every sandbox check at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    size: u64,
}

impl ResolvedPath {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes observed while resolving.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

/// Typed sandbox failure; maps 1:1 onto an envelope error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct PathResolutionError {
    pub error_type: ErrorType,
    pub message: String,
    pub details: Value,
}

impl PathResolutionError {
    fn new(error_type: ErrorType, message: &str, details: Value) -> Self {
        Self {
            error_type,
            message: message.to_string(),
            details,
        }
    }
}

/// Resolves paths against the configured allow-list.
pub struct PathSandbox<'a> {
    config: &'a dyn ConfigProvider,
    roots: Option<Vec<PathBuf>>,
    max_bytes: Option<u64>,
}

impl<'a> PathSandbox<'a> {
    /// Sandbox using the configured roots and byte ceiling.
    pub fn new(config: &'a dyn ConfigProvider) -> Self {
        Self {
            config,
            roots: None,
            max_bytes: None,
        }
    }

    /// Replace the default root set.
    pub fn with_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Replace the configured byte ceiling.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Resolve `raw` or explain why it is not admissible. The first failing
    /// check wins.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, PathResolutionError> {
        if raw.trim().is_empty() {
            return Err(PathResolutionError::new(
                ErrorType::InvalidInput,
                "Path is required.",
                json!({}),
            ));
        }

        let cwd = self.config.current_dir();
        let resolved = expand_home(raw)
            .and_then(|p| normalize(&p, &cwd))
            .map_err(|e| {
                PathResolutionError::new(
                    ErrorType::InvalidInput,
                    "Invalid path string.",
                    json!({ "error": e }),
                )
            })?;

        let roots: Vec<PathBuf> = self
            .roots
            .clone()
            .unwrap_or_else(|| self.config.default_allowed_roots())
            .iter()
            .map(|root| normalize_root(root, &cwd))
            .collect();

        if !roots.iter().any(|root| resolved.starts_with(root)) {
            tracing::warn!(path = %resolved.display(), "Rejected path outside allowed roots");
            return Err(PathResolutionError::new(
                ErrorType::PermissionDenied,
                "Path is outside allowed roots.",
                json!({
                    "path": resolved.display().to_string(),
                    "allowed_roots": roots
                        .iter()
                        .map(|r| r.display().to_string())
                        .collect::<Vec<_>>(),
                }),
            ));
        }

        let metadata = match std::fs::metadata(&resolved) {
            Ok(m) => m,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Err(PathResolutionError::new(
                    ErrorType::FileNotFound,
                    "File not found.",
                    json!({ "path": resolved.display().to_string() }),
                ));
            }
            Err(e) => {
                return Err(PathResolutionError::new(
                    ErrorType::RuntimeError,
                    "Unable to stat file.",
                    json!({ "path": resolved.display().to_string(), "error": e.to_string() }),
                ));
            }
        };

        if !metadata.is_file() {
            return Err(PathResolutionError::new(
                ErrorType::InvalidInput,
                "Path is not a file.",
                json!({ "path": resolved.display().to_string() }),
            ));
        }

        let limit = self
            .max_bytes
            .unwrap_or_else(|| self.config.max_file_bytes());
        let size = metadata.len();
        if size > limit {
            return Err(PathResolutionError::new(
                ErrorType::FileTooLarge,
                "File exceeds size limit.",
                json!({
                    "path": resolved.display().to_string(),
                    "size": size,
                    "max_bytes": limit,
                }),
            ));
        }

        Ok(ResolvedPath {
            path: resolved,
            size,
        })
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(raw: &str) -> Result<PathBuf, String> {
    if raw == "~" || raw.starts_with("~/") || raw.starts_with("~\\") {
        let home = dirs::home_dir().ok_or_else(|| "Could not determine home directory".to_string())?;
        let rest = raw[1..].trim_start_matches(['/', '\\']);
        return Ok(if rest.is_empty() { home } else { home.join(rest) });
    }
    Ok(PathBuf::from(raw))
}

/// Make `path` absolute and resolve `.`, `..` and symlinks without requiring
/// the tail of the path to exist.
///
/// Symlinks are resolved as each existing component is appended, so a later
/// `..` steps out of the link target rather than the link's parent, matching
/// what the kernel would do on open.
pub fn normalize(path: &Path, cwd: &Path) -> Result<PathBuf, String> {
    if path.as_os_str().to_string_lossy().contains('\0') {
        return Err("path contains a NUL byte".to_string());
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                match std::fs::symlink_metadata(&resolved) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        match std::fs::canonicalize(&resolved) {
                            Ok(target) => resolved = target,
                            // Dangling link: keep the lexical form.
                            Err(e) if e.kind() == ErrorKind::NotFound => {}
                            Err(e) => return Err(e.to_string()),
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(resolved)
}

fn normalize_root(root: &Path, cwd: &Path) -> PathBuf {
    let expanded = expand_home(&root.to_string_lossy()).unwrap_or_else(|_| root.to_path_buf());
    normalize(&expanded, cwd).unwrap_or(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StaticConfig, ALLOWED_ROOTS_ENV, MAX_FILE_BYTES_ENV};
    use tempfile::TempDir;

    fn setup() -> (TempDir, StaticConfig) {
        let dir = TempDir::new().unwrap();
        let cfg = StaticConfig::new(dir.path());
        (dir, cfg)
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let (_dir, cfg) = setup();
        let err = PathSandbox::new(&cfg).resolve("   ").unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidInput);
        assert_eq!(err.message, "Path is required.");
    }

    #[test]
    fn test_resolves_file_inside_root() {
        let (dir, cfg) = setup();
        let file = dir.path().join("a.cif");
        std::fs::write(&file, "data_x").unwrap();
        let resolved = PathSandbox::new(&cfg).resolve("a.cif").unwrap();
        assert_eq!(resolved.path(), std::fs::canonicalize(&file).unwrap());
        assert_eq!(resolved.size(), 6);
    }

    #[test]
    fn test_dotdot_escape_is_denied() {
        let (dir, cfg) = setup();
        let inner = dir.path().join("inner");
        std::fs::create_dir(&inner).unwrap();
        let cfg = cfg.with_cwd(&inner).with_repo_root(&inner);
        let err = PathSandbox::new(&cfg)
            .with_roots(vec![inner.clone()])
            .resolve("../outside.cif")
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::PermissionDenied);
        assert!(err.details["allowed_roots"].as_array().unwrap().len() == 1);
    }

    #[test]
    fn test_sibling_prefix_is_not_contained() {
        let (dir, cfg) = setup();
        let root = dir.path().join("data");
        let sibling = dir.path().join("database");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(&sibling).unwrap();
        std::fs::write(sibling.join("x.cif"), "x").unwrap();
        let err = PathSandbox::new(&cfg)
            .with_roots(vec![root])
            .resolve(&sibling.join("x.cif").to_string_lossy())
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::PermissionDenied);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_is_denied() {
        let (dir, cfg) = setup();
        let root = dir.path().join("root");
        let outside = dir.path().join("outside");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(&outside).unwrap();
        std::fs::write(outside.join("secret.cif"), "s").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();
        let err = PathSandbox::new(&cfg)
            .with_roots(vec![root.clone()])
            .resolve(&root.join("link/secret.cif").to_string_lossy())
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::PermissionDenied);
    }

    #[test]
    fn test_missing_file_inside_root() {
        let (dir, cfg) = setup();
        let err = PathSandbox::new(&cfg)
            .resolve(&dir.path().join("missing.cif").to_string_lossy())
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::FileNotFound);
    }

    #[test]
    fn test_path_below_regular_file_is_missing() {
        let (dir, cfg) = setup();
        std::fs::write(dir.path().join("a.cif"), "data_x").unwrap();
        let err = PathSandbox::new(&cfg)
            .resolve(&dir.path().join("a.cif/child.cif").to_string_lossy())
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::FileNotFound);
        assert_eq!(err.message, "File not found.");
    }

    #[test]
    fn test_directory_is_invalid_input() {
        let (dir, cfg) = setup();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let err = PathSandbox::new(&cfg).resolve("sub").unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidInput);
        assert_eq!(err.message, "Path is not a file.");
    }

    #[test]
    fn test_size_ceiling_from_config_and_override() {
        let (dir, cfg) = setup();
        std::fs::write(dir.path().join("f.cif"), vec![b'0'; 100]).unwrap();

        let cfg = cfg.with_var(MAX_FILE_BYTES_ENV, "99");
        let err = PathSandbox::new(&cfg).resolve("f.cif").unwrap_err();
        assert_eq!(err.error_type, ErrorType::FileTooLarge);
        assert_eq!(err.details["size"], 100);
        assert_eq!(err.details["max_bytes"], 99);

        assert!(PathSandbox::new(&cfg)
            .with_max_bytes(100)
            .resolve("f.cif")
            .is_ok());
    }

    #[test]
    fn test_extra_roots_from_config() {
        let (dir, cfg) = setup();
        let elsewhere = TempDir::new().unwrap();
        std::fs::write(elsewhere.path().join("x.cif"), "x").unwrap();
        let target = elsewhere.path().join("x.cif").to_string_lossy().into_owned();

        let cfg = cfg
            .with_cwd(dir.path())
            .with_repo_root(dir.path());
        assert_eq!(
            PathSandbox::new(&cfg).resolve(&target).unwrap_err().error_type,
            ErrorType::PermissionDenied
        );

        let cfg = cfg.with_var(ALLOWED_ROOTS_ENV, elsewhere.path().to_string_lossy());
        assert!(PathSandbox::new(&cfg).resolve(&target).is_ok());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (dir, cfg) = setup();
        std::fs::write(dir.path().join("a.cif"), "abc").unwrap();
        let sandbox = PathSandbox::new(&cfg);
        assert_eq!(sandbox.resolve("a.cif").unwrap(), sandbox.resolve("./a.cif").unwrap());
    }

    #[test]
    fn test_normalize_handles_dots_lexically_for_missing_tail() {
        let cwd = Path::new("/nonexistent-root-for-test");
        let out = normalize(Path::new("a/./b/../c"), cwd).unwrap();
        assert_eq!(out, PathBuf::from("/nonexistent-root-for-test/a/c"));
    }

    #[test]
    fn test_normalize_rejects_nul() {
        assert!(normalize(Path::new("a\0b"), Path::new("/")).is_err());
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_escaping_dotdot_never_resolves(
                depth in 1usize..4,
                extra in 1usize..4,
                name in "[a-z]{1,8}",
            ) {
                let (dir, cfg) = setup();
                let mut nested = dir.path().to_path_buf();
                for i in 0..depth {
                    nested = nested.join(format!("d{i}"));
                }
                std::fs::create_dir_all(&nested).unwrap();
                let cfg = cfg.with_cwd(&nested).with_repo_root(&nested);
                let raw = format!("{}{}", "../".repeat(depth + extra), name);
                let result = PathSandbox::new(&cfg)
                    .with_roots(vec![nested.clone()])
                    .resolve(&raw);
                prop_assert!(result.is_err());
                prop_assert_eq!(result.unwrap_err().error_type, ErrorType::PermissionDenied);
            }
        }
    }
}
