//! Workspace roots, active-root lookup, and file search.

mod resolver;

pub use resolver::{
    ConfigCandidateSet, ConfigResolver, ResolveError, build_matcher, glob_alternation,
    normalize_search_path, select_config,
};

use globset::GlobSet;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Root directory plus the patterns used to find its Psalm config.
///
/// Replaced wholesale on a workspace switch, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContext {
    pub workspace_root: PathBuf,
    pub config_search_patterns: Vec<String>,
}

impl WorkspaceContext {
    pub fn new(workspace_root: impl Into<PathBuf>, config_search_patterns: Vec<String>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            config_search_patterns,
        }
    }
}

/// Workspace/editor surface.
pub trait Workspace: Send + Sync {
    /// Workspace roots in priority order.
    fn roots(&self) -> Vec<PathBuf>;

    /// The root that contains `document`, if any.
    fn root_for(&self, document: &Path) -> Option<PathBuf>;

    /// Files under any root whose root-relative path matches `matcher`, in search order.
    fn find_files(&self, matcher: &GlobSet) -> Vec<PathBuf>;
}

/// Root associated with the focused document, else the first root.
pub fn active_root(workspace: &dyn Workspace, document: Option<&Path>) -> Option<PathBuf> {
    document
        .and_then(|doc| workspace.root_for(doc))
        .or_else(|| workspace.roots().into_iter().next())
}

/// Workspace backed by real directories on disk.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    roots: Vec<PathBuf>,
}

impl FsWorkspace {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl Workspace for FsWorkspace {
    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    fn root_for(&self, document: &Path) -> Option<PathBuf> {
        // Innermost root wins when roots are nested
        self.roots
            .iter()
            .filter(|root| document.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }

    fn find_files(&self, matcher: &GlobSet) -> Vec<PathBuf> {
        let mut found = Vec::new();

        for root in &self.roots {
            // Whole tree: ignore files do not hide configs (a local psalm.xml is
            // usually gitignored); only the .git directory itself is skipped
            let mut builder = WalkBuilder::new(root);
            builder
                .standard_filters(false)
                .follow_links(false)
                .filter_entry(|entry| entry.file_name() != ".git")
                .sort_by_file_name(|a, b| a.cmp(b));

            let files = builder
                .build()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()));

            for entry in files {
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                if matcher.is_match(relative) && !found.iter().any(|p| p == path) {
                    found.push(path.to_path_buf());
                }
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_root_for_prefers_innermost() {
        let workspace = FsWorkspace::new(vec![
            PathBuf::from("/work"),
            PathBuf::from("/work/nested"),
        ]);
        assert_eq!(
            workspace.root_for(Path::new("/work/nested/src/A.php")),
            Some(PathBuf::from("/work/nested"))
        );
        assert_eq!(
            workspace.root_for(Path::new("/work/B.php")),
            Some(PathBuf::from("/work"))
        );
        // Component-wise: /workshop is not inside /work
        assert_eq!(workspace.root_for(Path::new("/workshop/C.php")), None);
    }

    #[test]
    fn test_active_root_falls_back_to_first() {
        let workspace = FsWorkspace::new(vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(active_root(&workspace, None), Some(PathBuf::from("/a")));
        assert_eq!(
            active_root(&workspace, Some(Path::new("/b/x.php"))),
            Some(PathBuf::from("/b"))
        );
        assert_eq!(
            active_root(&workspace, Some(Path::new("/elsewhere/x.php"))),
            Some(PathBuf::from("/a"))
        );

        let empty = FsWorkspace::new(Vec::new());
        assert_eq!(active_root(&empty, None), None);
    }

    #[test]
    fn test_find_files_matches_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("app/config")).unwrap();
        fs::write(root.join("psalm.xml"), "<psalm/>").unwrap();
        fs::write(root.join("app/config/psalm.xml"), "<psalm/>").unwrap();
        fs::write(root.join("app/psalm.xml.dist"), "<psalm/>").unwrap();
        fs::write(root.join("README.md"), "# readme").unwrap();

        let workspace = FsWorkspace::new(vec![root.to_path_buf()]);

        let top_only = build_matcher(&patterns(&["psalm.xml"])).unwrap();
        assert_eq!(workspace.find_files(&top_only), vec![root.join("psalm.xml")]);

        let anywhere = build_matcher(&patterns(&["**/psalm.xml"])).unwrap();
        let found = workspace.find_files(&anywhere);
        assert_eq!(found.len(), 2);
        assert!(found.contains(&root.join("psalm.xml")));
        assert!(found.contains(&root.join("app/config/psalm.xml")));
    }

    #[test]
    fn test_find_files_sees_ignored_and_hidden_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".config")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".gitignore"), "psalm.xml\n").unwrap();
        fs::write(root.join("psalm.xml"), "<psalm/>").unwrap();
        fs::write(root.join(".config/psalm.xml"), "<psalm/>").unwrap();
        fs::write(root.join(".git/psalm.xml"), "<psalm/>").unwrap();

        let workspace = FsWorkspace::new(vec![root.to_path_buf()]);
        let matcher = build_matcher(&patterns(&["**/psalm.xml"])).unwrap();
        let found = workspace.find_files(&matcher);

        assert_eq!(found.len(), 2);
        assert!(found.contains(&root.join("psalm.xml")));
        assert!(found.contains(&root.join(".config/psalm.xml")));
    }
}
