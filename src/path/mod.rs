//! Root-relative path handling.
//!
//! Every document, identifier and cluster member is keyed by a
//! forward-slash path relative to the index root. This module owns that
//! conversion and the ignored-prefix filter shared by the walker and the
//! refresh tracker.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum PathError {
    /// Path is outside the index root.
    OutsideRoot { path: String, root: String },
    /// Path cannot be represented as UTF-8.
    NonUtf8 { path: PathBuf },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::OutsideRoot { path, root } => {
                write!(f, "Path '{}' is outside index root '{}'", path, root)
            }
            PathError::NonUtf8 { path } => {
                write!(f, "Path contains non-UTF-8 characters: {}", path.display())
            }
        }
    }
}

impl std::error::Error for PathError {}

/// Converts a path to a comparable string: UNC prefixes simplified via
/// dunce, backslashes turned into forward slashes.
pub fn normalize_slashes(path: &Path) -> Result<String, PathError> {
    let simplified = dunce::simplified(path);
    let s = simplified.to_str().ok_or_else(|| PathError::NonUtf8 {
        path: simplified.to_path_buf(),
    })?;
    Ok(s.replace('\\', "/"))
}

#[derive(Debug, Clone)]
pub struct RepoPaths {
    root: PathBuf,
    root_str: String,
    ignored: Vec<String>,
    /// Root-relative directories excluded regardless of `ignored`.
    excluded: Vec<String>,
}

impl RepoPaths {
    pub fn new(root: impl Into<PathBuf>, ignored_prefixes: &[String]) -> Self {
        let root = root.into();
        let root_str = normalize_slashes(&root)
            .unwrap_or_else(|_| root.to_string_lossy().replace('\\', "/"))
            .trim_end_matches('/')
            .to_string();
        let ignored = ignored_prefixes
            .iter()
            .map(|p| p.trim_matches('/').replace('\\', "/"))
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            root,
            root_str,
            ignored,
            excluded: Vec::new(),
        }
    }

    /// Always skips `dir` when it lies under the root. Unlike ignored
    /// prefixes this match is anchored at the root.
    pub fn excluding(mut self, dir: &Path) -> Self {
        if let Ok(rel) = self.relative(dir) {
            if rel != "." && !self.excluded.contains(&rel) {
                self.excluded.push(rel);
            }
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative, forward-slash form of `path`. Relative inputs are taken
    /// as already root-relative. Any `..` component is rejected, so the
    /// result always names something under the root.
    pub fn relative(&self, path: &Path) -> Result<String, PathError> {
        let normalized = normalize_slashes(path)?;
        let rest = if path.is_absolute() {
            normalized
                .strip_prefix(&self.root_str)
                .filter(|rest| rest.is_empty() || rest.starts_with('/'))
                .map(|rest| rest.trim_start_matches('/'))
        } else {
            let rest = normalized.trim_start_matches("./");
            (!rest.starts_with('/')).then_some(rest)
        };
        let components: Option<Vec<&str>> = rest.map(|rest| {
            rest.split('/')
                .filter(|c| !c.is_empty() && *c != ".")
                .collect()
        });
        match components {
            Some(components) if !components.contains(&"..") => {
                if components.is_empty() {
                    Ok(".".to_string())
                } else {
                    Ok(components.join("/"))
                }
            }
            _ => Err(PathError::OutsideRoot {
                path: normalized,
                root: self.root_str.clone(),
            }),
        }
    }

    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// True when any leading component run of `relative` equals an ignored
    /// prefix. `node_modules` matches `node_modules/x.js` and
    /// `web/node_modules/x.js`, never `node_modules_old/x.js`.
    pub fn is_ignored(&self, relative: &str) -> bool {
        let relative = relative.trim_start_matches("./");
        let excluded = self.excluded.iter().any(|dir| {
            relative
                .strip_prefix(dir.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        });
        if excluded {
            return true;
        }
        let components: Vec<&str> = relative.split('/').filter(|c| !c.is_empty()).collect();
        self.ignored.iter().any(|prefix| {
            let wanted: Vec<&str> = prefix.split('/').collect();
            if wanted.len() > components.len() {
                return false;
            }
            components
                .windows(wanted.len())
                .any(|window| window == wanted.as_slice())
        })
    }
}
