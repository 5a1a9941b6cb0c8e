//! `cd`-style path resolution for the terminal.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use crate::error::BridgeError;

/// Placeholder the UI uses for the home directory before it knows the real path
pub const HOME_PLACEHOLDER: &str = "~";

/// The current user's home directory
pub fn home_dir() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().context("could not determine home directory")?;
    Ok(dirs.home_dir().to_path_buf())
}

/// Resolve `.` and `..` without touching the filesystem.
///
/// `..` never climbs above the root; leading `..` of a relative path are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => out.push(comp.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Work out which path `cd <segment>` from `cwd` refers to, without validating it.
pub fn expand(cwd: &str, segment: &str, home: &Path) -> PathBuf {
    let base = if cwd == HOME_PLACEHOLDER {
        home.to_path_buf()
    } else {
        PathBuf::from(cwd)
    };

    let seg = segment.trim();
    if seg.is_empty() || seg == HOME_PLACEHOLDER {
        return home.to_path_buf();
    }

    let expanded = match seg.strip_prefix('~') {
        Some(rest) => {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            home.join(if rest.is_empty() { "." } else { rest })
        }
        None => PathBuf::from(seg),
    };

    if expanded.is_absolute() {
        return normalize(&expanded);
    }

    let joined = base.join(expanded);
    if joined.is_absolute() {
        normalize(&joined)
    } else {
        // relative cwd: anchor on the host process's own working directory
        let anchored = std::env::current_dir()
            .map(|d| d.join(&joined))
            .unwrap_or(joined);
        normalize(&anchored)
    }
}

/// Resolve `segment` against `cwd` and check that it names an existing directory.
///
/// Errors echo `segment` as the user typed it (`~` when empty), like a shell would.
pub async fn resolve(cwd: &str, segment: &str, home: &Path) -> Result<PathBuf, BridgeError> {
    let resolved = expand(cwd, segment, home);
    let shown = if segment.is_empty() {
        HOME_PLACEHOLDER
    } else {
        segment
    };

    // Anything that keeps us from stat-ing the path counts as "doesn't exist"
    let meta = fs::metadata(&resolved)
        .await
        .map_err(|_| BridgeError::NotFound(shown.to_string()))?;
    if !meta.is_dir() {
        return Err(BridgeError::NotADirectory(shown.to_string()));
    }
    Ok(resolved)
}
