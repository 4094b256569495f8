//! Discovery of local datasets under the asset root.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use serde_json::{json, Value};
use tracing::warn;

use crate::config::ConfigProvider;

/// A dataset the tools look for: preferred file names first, then globs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetSpec {
    pub subdir: Option<&'static str>,
    pub preferred: &'static [&'static str],
    pub globs: &'static [&'static str],
}

pub const COMPOSITION_INDEX: AssetSpec = AssetSpec {
    subdir: Some("embedding"),
    preferred: &["mp_dataset_composition.json"],
    globs: &["*composition*.json"],
};

pub const STRUCTURE_INDEX: AssetSpec = AssetSpec {
    subdir: Some("embedding"),
    preferred: &["mp_dataset_structure.json"],
    globs: &["*structure*.json"],
};

pub const RECIPES_DATASET: AssetSpec = AssetSpec {
    subdir: None,
    preferred: &["mp_synthesis_recipes.json"],
    globs: &["*synthesis*recipes*.json"],
};

impl AssetSpec {
    pub fn base_dir(&self, assets_dir: &Path) -> PathBuf {
        match self.subdir {
            Some(sub) => assets_dir.join(sub),
            None => assets_dir.to_path_buf(),
        }
    }

    pub fn locate(&self, config: &dyn ConfigProvider) -> Option<PathBuf> {
        find_asset(self.preferred, self.globs, &self.base_dir(&config.assets_dir()))
    }

    pub fn list(&self, config: &dyn ConfigProvider) -> Vec<String> {
        list_asset_files(&self.base_dir(&config.assets_dir()), self.globs)
    }

    /// Details attached to a `file_not_found` error for this asset.
    pub fn missing_details(&self, config: &dyn ConfigProvider) -> Value {
        json!({
            "base_dir": self.base_dir(&config.assets_dir()).display().to_string(),
            "preferred_names": self.preferred,
            "globs": self.globs,
        })
    }
}

/// First existing preferred name, else the lexicographically first regular
/// file matching any glob, in glob order.
pub fn find_asset(preferred: &[&str], globs: &[&str], base: &Path) -> Option<PathBuf> {
    if !base.is_dir() {
        return None;
    }
    if let Some(found) = preferred
        .iter()
        .map(|name| base.join(name))
        .find(|candidate| candidate.exists())
    {
        return Some(found);
    }
    let names = regular_file_names(base);
    compile_globs(globs).iter().find_map(|matcher| {
        names
            .iter()
            .find(|name| matcher.is_match(name.as_str()))
            .map(|name| base.join(name))
    })
}

/// Sorted, de-duplicated names of regular files matching any glob.
pub fn list_asset_files(base: &Path, globs: &[&str]) -> Vec<String> {
    let set = glob_set(globs);
    let mut out: Vec<String> = regular_file_names(base)
        .into_iter()
        .filter(|name| set.is_match(name.as_str()))
        .collect();
    out.sort();
    out.dedup();
    out
}

fn regular_file_names(base: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(base) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}

fn build_glob(pattern: &str) -> Option<Glob> {
    match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => Some(glob),
        Err(e) => {
            warn!(pattern, error = %e, "Ignoring invalid asset glob");
            None
        }
    }
}

/// One matcher per pattern, in pattern order.
fn compile_globs(globs: &[&str]) -> Vec<GlobMatcher> {
    globs
        .iter()
        .filter_map(|p| build_glob(p))
        .map(|g| g.compile_matcher())
        .collect()
}

fn glob_set(globs: &[&str]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for glob in globs.iter().filter_map(|p| build_glob(p)) {
        builder.add(glob);
    }
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to compile asset globs");
        GlobSet::empty()
    })
}
