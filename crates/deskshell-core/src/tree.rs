//! Directory listing for the explorer tree.
//!
//! Listings are one level deep; folders come back with [`ChildState::NotLoaded`] and the UI
//! asks for their children when they are expanded.

use std::path::Path;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::BridgeError;

/// Directory names that never show up in a listing, at any depth
pub const SKIP_DIRS: &[&str] = &["node_modules", ".git", ".next", "__pycache__", ".venv", "venv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// Whether a node's children have been fetched
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChildState {
    #[default]
    NotLoaded,
    Loaded(Vec<TreeNode>),
    LoadFailed,
}

/// One filesystem entry as shown in the explorer. Metadata only, never contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    pub children: ChildState,
}

impl TreeNode {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            children: ChildState::NotLoaded,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Record the outcome of a lazy child fetch
    pub fn set_children(&mut self, result: Result<Vec<TreeNode>, BridgeError>) {
        self.children = match result {
            Ok(children) => ChildState::Loaded(children),
            Err(_) => ChildState::LoadFailed,
        };
    }
}

// Wire form: `children` absent = not loaded, array = loaded, null + loadFailed = failed
impl Serialize for TreeNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("path", &self.path)?;
        map.serialize_entry("type", &self.kind)?;
        match &self.children {
            ChildState::NotLoaded => {}
            ChildState::Loaded(children) => map.serialize_entry("children", children)?,
            ChildState::LoadFailed => {
                map.serialize_entry("children", &Option::<Vec<TreeNode>>::None)?;
                map.serialize_entry("loadFailed", &true)?;
            }
        }
        map.end()
    }
}

/// List the immediate entries of `dir`, skipping [`SKIP_DIRS`].
///
/// Entries keep the order the OS hands them out. Symlinks are classified by the link
/// itself, so a link to a directory is a `File`.
pub async fn list_children(dir: &Path) -> Result<Vec<TreeNode>, BridgeError> {
    let shown = dir.to_string_lossy().to_string();

    let meta = fs::metadata(dir)
        .await
        .map_err(|e| BridgeError::from_io(&e, &shown))?;
    if !meta.is_dir() {
        return Err(BridgeError::NotADirectory(shown));
    }

    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| BridgeError::from_io(&e, &shown))?;

    let mut nodes = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(e) => {
                warn!("stopped reading {}: {}", shown, e);
                break;
            }
        };

        let name = entry.file_name().to_string_lossy().to_string();
        if SKIP_DIRS.contains(&name.as_str()) {
            continue;
        }

        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(e) => {
                warn!("skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        let kind = if file_type.is_dir() {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        nodes.push(TreeNode::new(
            name,
            entry.path().to_string_lossy().to_string(),
            kind,
        ));
    }

    debug!("listed {} entries in {}", nodes.len(), shown);
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(nodes: &[TreeNode]) -> HashSet<String> {
        nodes.iter().map(|n| n.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_lists_immediate_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("README.md"), "hi").unwrap();

        let nodes = list_children(dir.path()).await.unwrap();
        assert_eq!(nodes.len(), 2);

        let src = nodes.iter().find(|n| n.name == "src").unwrap();
        assert_eq!(src.kind, NodeKind::Folder);
        assert_eq!(src.children, ChildState::NotLoaded);
        assert_eq!(src.path, dir.path().join("src").to_string_lossy());

        let readme = nodes.iter().find(|n| n.name == "README.md").unwrap();
        assert_eq!(readme.kind, NodeKind::File);
    }

    #[tokio::test]
    async fn test_skips_noise_directories() {
        let dir = tempfile::tempdir().unwrap();
        for name in SKIP_DIRS {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::create_dir(dir.path().join("app")).unwrap();
        std::fs::create_dir(dir.path().join("app/node_modules")).unwrap();
        std::fs::create_dir(dir.path().join("app/lib")).unwrap();

        let top = list_children(dir.path()).await.unwrap();
        assert_eq!(names(&top), HashSet::from(["app".to_string()]));

        let nested = list_children(&dir.path().join("app")).await.unwrap();
        assert_eq!(names(&nested), HashSet::from(["lib".to_string()]));
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_children(dir.path()).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_to_directory_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let nodes = list_children(dir.path()).await.unwrap();
        let link = nodes.iter().find(|n| n.name == "link").unwrap();
        assert_eq!(link.kind, NodeKind::File);
        let real = nodes.iter().find(|n| n.name == "real").unwrap();
        assert_eq!(real.kind, NodeKind::Folder);
    }

    #[tokio::test]
    async fn test_missing_and_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            list_children(&missing).await,
            Err(BridgeError::NotFound(_))
        ));

        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            list_children(&file).await,
            Err(BridgeError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_listings_do_not_interfere() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for i in 0..20 {
            std::fs::write(a.path().join(format!("a{}", i)), "").unwrap();
            std::fs::write(b.path().join(format!("b{}", i)), "").unwrap();
        }

        let (left, right) = tokio::join!(list_children(a.path()), list_children(b.path()));
        let left = left.unwrap();
        let right = right.unwrap();
        assert_eq!(left.len(), 20);
        assert_eq!(right.len(), 20);
        assert!(left.iter().all(|n| n.name.starts_with('a')));
        assert!(right.iter().all(|n| n.name.starts_with('b')));
    }

    #[test]
    fn test_wire_form_of_child_states() {
        let mut node = TreeNode::new("src", "/p/src", NodeKind::Folder);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "folder");
        assert!(json.get("children").is_none());

        node.set_children(Ok(vec![]));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["children"], serde_json::json!([]));

        node.set_children(Err(BridgeError::NotFound("/p/src".into())));
        let json = serde_json::to_value(&node).unwrap();
        assert!(json["children"].is_null());
        assert_eq!(json["loadFailed"], true);
    }
}
