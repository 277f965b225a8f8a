//! Bounded depth-first search for a skeleton's project root.
//!
//! Skeleton archives may wrap the real project in any number of directories
//! (`android-skeleton-v3/`, `dist/package/`, ...). The search is written
//! against [`DirTree`] so it runs the same over the filesystem and over an
//! in-memory tree in tests.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BuildError;

/// Default depth bound used by the build pipeline.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// A marker that identifies a project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// A file at this path relative to the candidate directory.
    File(&'static str),
    /// A child directory whose name ends with `suffix` and contains `file`.
    DirWithFile {
        suffix: &'static str,
        file: &'static str,
    },
}

/// Read-only view of a directory hierarchy.
pub trait DirTree {
    type Node: Clone;

    /// Immediate subdirectories of `node`, in a stable order.
    fn subdirs(&self, node: &Self::Node) -> Vec<Self::Node>;

    /// Last path component of `node`.
    fn name(&self, node: &Self::Node) -> String;

    /// Whether a regular file exists at `rel` below `node`.
    fn has_file(&self, node: &Self::Node, rel: &str) -> bool;
}

impl Marker {
    pub fn matches<T: DirTree>(&self, tree: &T, node: &T::Node) -> bool {
        match self {
            Marker::File(rel) => tree.has_file(node, rel),
            Marker::DirWithFile { suffix, file } => tree
                .subdirs(node)
                .iter()
                .any(|child| tree.name(child).ends_with(suffix) && tree.has_file(child, file)),
        }
    }
}

/// Return the first directory at or below `start` matching any marker,
/// searching at most `max_depth` levels down.
pub fn find_root<T: DirTree>(
    tree: &T,
    start: &T::Node,
    markers: &[Marker],
    max_depth: usize,
) -> Option<T::Node> {
    if markers.iter().any(|m| m.matches(tree, start)) {
        return Some(start.clone());
    }
    if max_depth == 0 {
        return None;
    }
    tree.subdirs(start)
        .iter()
        .find_map(|child| find_root(tree, child, markers, max_depth - 1))
}

/// Filesystem [`DirTree`] rooted at real paths.
pub struct FsTree;

impl DirTree for FsTree {
    type Node = PathBuf;

    fn subdirs(&self, node: &PathBuf) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(node) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| !is_archive_noise(p))
            .collect();
        dirs.sort();
        dirs
    }

    fn name(&self, node: &PathBuf) -> String {
        node.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn has_file(&self, node: &PathBuf, rel: &str) -> bool {
        node.join(rel).is_file()
    }
}

// Resource-fork folders added by macOS archivers.
fn is_archive_noise(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == "__MACOSX")
}

/// Locate the project root of an extracted skeleton on disk.
pub fn locate_project_root(
    dir: &Path,
    markers: &[Marker],
    max_depth: usize,
) -> Result<PathBuf, BuildError> {
    find_root(&FsTree, &dir.to_path_buf(), markers, max_depth).ok_or_else(|| {
        BuildError::InvalidSkeletonStructure(format!(
            "no project marker ({}) found within {max_depth} levels of {}",
            describe(markers),
            dir.display()
        ))
    })
}

fn describe(markers: &[Marker]) -> String {
    markers
        .iter()
        .map(|m| match m {
            Marker::File(rel) => (*rel).to_string(),
            Marker::DirWithFile { suffix, file } => format!("*{suffix}/{file}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    /// In-memory tree built from a list of file paths.
    struct MemTree {
        files: BTreeSet<String>,
    }

    impl MemTree {
        fn new(files: &[&str]) -> Self {
            Self {
                files: files.iter().map(|f| f.to_string()).collect(),
            }
        }

        fn join(node: &str, rel: &str) -> String {
            if node.is_empty() {
                rel.to_string()
            } else {
                format!("{node}/{rel}")
            }
        }
    }

    impl DirTree for MemTree {
        type Node = String;

        fn subdirs(&self, node: &String) -> Vec<String> {
            let prefix = if node.is_empty() {
                String::new()
            } else {
                format!("{node}/")
            };
            let dirs: BTreeSet<String> = self
                .files
                .iter()
                .filter_map(|f| f.strip_prefix(&prefix))
                .filter_map(|rest| rest.split_once('/').map(|(dir, _)| dir))
                .map(|dir| Self::join(node, dir))
                .collect();
            dirs.into_iter().collect()
        }

        fn name(&self, node: &String) -> String {
            node.rsplit('/').next().unwrap_or_default().to_string()
        }

        fn has_file(&self, node: &String, rel: &str) -> bool {
            self.files.contains(&Self::join(node, rel))
        }
    }

    const ANDROID: &[Marker] = &[Marker::File("app/src/main/AndroidManifest.xml")];
    const IOS: &[Marker] = &[Marker::DirWithFile {
        suffix: ".xcodeproj",
        file: "project.pbxproj",
    }];

    #[test]
    fn root_at_top_level() {
        let tree = MemTree::new(&["app/src/main/AndroidManifest.xml", "build.gradle"]);
        assert_eq!(find_root(&tree, &String::new(), ANDROID, 3), Some(String::new()));
    }

    #[test]
    fn root_inside_wrapper_directories() {
        let tree = MemTree::new(&[
            "README.md",
            "skeleton-v2/android/app/src/main/AndroidManifest.xml",
        ]);
        assert_eq!(
            find_root(&tree, &String::new(), ANDROID, 3),
            Some("skeleton-v2/android".to_string())
        );
    }

    #[test]
    fn depth_bound_is_respected() {
        let tree = MemTree::new(&["a/b/c/d/app/src/main/AndroidManifest.xml"]);
        assert_eq!(find_root(&tree, &String::new(), ANDROID, 3), None);
        assert_eq!(
            find_root(&tree, &String::new(), ANDROID, 4),
            Some("a/b/c/d".to_string())
        );
    }

    #[test]
    fn first_match_in_name_order_wins() {
        let tree = MemTree::new(&[
            "b/app/src/main/AndroidManifest.xml",
            "a/app/src/main/AndroidManifest.xml",
        ]);
        assert_eq!(
            find_root(&tree, &String::new(), ANDROID, 3),
            Some("a".to_string())
        );
    }

    #[test]
    fn dir_with_file_marker() {
        let tree = MemTree::new(&[
            "wrap/WebApp.xcodeproj/project.pbxproj",
            "wrap/WebApp/Info.plist",
        ]);
        assert_eq!(
            find_root(&tree, &String::new(), IOS, 3),
            Some("wrap".to_string())
        );

        let missing = MemTree::new(&["wrap/WebApp.xcodeproj/other.txt"]);
        assert_eq!(find_root(&missing, &String::new(), IOS, 3), None);
    }

    #[test]
    fn filesystem_search_reports_invalid_structure() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("outer/inner")).unwrap();
        fs::write(dir.path().join("outer/inner/install.sh"), "#!/bin/sh\n").unwrap();

        let root =
            locate_project_root(dir.path(), &[Marker::File("install.sh")], DEFAULT_MAX_DEPTH)
                .unwrap();
        assert_eq!(root, dir.path().join("outer/inner"));

        let err = locate_project_root(dir.path(), &[Marker::File("manifest.json")], 3).unwrap_err();
        assert!(matches!(err, BuildError::InvalidSkeletonStructure(_)));
        assert!(err.to_string().contains("manifest.json"));
    }

    #[test]
    fn macos_resource_forks_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("__MACOSX")).unwrap();
        fs::write(dir.path().join("__MACOSX/install.sh"), "").unwrap();
        fs::create_dir_all(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real/install.sh"), "").unwrap();

        let root = locate_project_root(dir.path(), &[Marker::File("install.sh")], 3).unwrap();
        assert_eq!(root, dir.path().join("real"));
    }
}
