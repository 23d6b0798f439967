//! Locating the Psalm XML config that governs a workspace.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::{Workspace, WorkspaceContext};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No config paths defined. Define some and reload")]
    NoPatternsConfigured,

    #[error("Invalid config path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Every file matching the search patterns, plus the one chosen to configure the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigCandidateSet {
    pub patterns: Vec<String>,
    pub matches: Vec<PathBuf>,
    pub selected: Option<PathBuf>,
}

impl ConfigCandidateSet {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Finds config candidates through a [`Workspace`] and picks the authoritative one.
#[derive(Clone)]
pub struct ConfigResolver {
    workspace: Arc<dyn Workspace>,
}

impl ConfigResolver {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    /// Search every root for the context's patterns and select against its root.
    ///
    /// An empty match list is not an error: the result simply has no selection.
    pub fn resolve(&self, context: &WorkspaceContext) -> Result<ConfigCandidateSet, ResolveError> {
        let patterns = &context.config_search_patterns;
        let matcher = build_matcher(patterns)?;

        crate::debug_event!("resolver", "searching", "{}", glob_alternation(patterns));

        let backslash = std::path::MAIN_SEPARATOR == '\\';
        let matches: Vec<PathBuf> = self
            .workspace
            .find_files(&matcher)
            .iter()
            .map(|path| normalize_search_path(&path.to_string_lossy(), backslash))
            .collect();

        let selected = select_config(&matches, &context.workspace_root);

        Ok(ConfigCandidateSet {
            patterns: patterns.clone(),
            matches,
            selected,
        })
    }
}

/// The patterns joined as one brace alternation, e.g. `{psalm.xml,psalm.xml.dist}`.
pub fn glob_alternation(patterns: &[String]) -> String {
    format!("{{{}}}", patterns.join(","))
}

/// Compile the patterns into one matcher with union semantics.
///
/// Patterns are matched against root-relative paths; `*` does not cross `/`.
pub fn build_matcher(patterns: &[String]) -> Result<GlobSet, ResolveError> {
    if patterns.is_empty() {
        return Err(ResolveError::NoPatternsConfigured);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::InvalidPattern {
                pattern: pattern.clone(),
                reason: "pattern is empty".to_string(),
            });
        }
        let mut glob = GlobBuilder::new(trimmed);
        glob.literal_separator(true);
        if cfg!(windows) {
            glob.case_insensitive(true);
        }
        let glob = glob.build().map_err(|e| ResolveError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }

    builder.build().map_err(|e| ResolveError::InvalidPattern {
        pattern: glob_alternation(patterns),
        reason: e.to_string(),
    })
}

/// First match inside `root`, else the first match, else `None`.
///
/// Containment is component-wise, so `/repo-old/psalm.xml` is not inside `/repo`.
pub fn select_config(matches: &[PathBuf], root: &Path) -> Option<PathBuf> {
    matches
        .iter()
        .find(|path| path.starts_with(root))
        .or_else(|| matches.first())
        .cloned()
}

/// Turn a search-layer path into a native one.
///
/// With `backslash` set, `/` becomes `\` and the leading separator left over from
/// a URI path (`/C:/repo/psalm.xml`) is dropped. Otherwise the path is unchanged.
pub fn normalize_search_path(raw: &str, backslash: bool) -> PathBuf {
    if !backslash {
        return PathBuf::from(raw);
    }

    let converted = raw.replace('/', "\\");
    let mut chars = converted.chars();
    let has_drive_artifact = chars.next() == Some('\\')
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.next() == Some(':');

    if has_drive_artifact {
        PathBuf::from(&converted[1..])
    } else {
        PathBuf::from(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct FixedWorkspace {
        roots: Vec<PathBuf>,
        files: Vec<PathBuf>,
    }

    impl Workspace for FixedWorkspace {
        fn roots(&self) -> Vec<PathBuf> {
            self.roots.clone()
        }

        fn root_for(&self, document: &Path) -> Option<PathBuf> {
            self.roots.iter().find(|r| document.starts_with(r)).cloned()
        }

        fn find_files(&self, matcher: &GlobSet) -> Vec<PathBuf> {
            self.files
                .iter()
                .filter(|file| {
                    self.roots.iter().any(|root| {
                        file.strip_prefix(root)
                            .is_ok_and(|relative| matcher.is_match(relative))
                    })
                })
                .cloned()
                .collect()
        }
    }

    fn resolver(roots: &[&str], files: &[&str]) -> ConfigResolver {
        ConfigResolver::new(Arc::new(FixedWorkspace {
            roots: roots.iter().map(PathBuf::from).collect(),
            files: files.iter().map(PathBuf::from).collect(),
        }))
    }

    #[test]
    fn test_prefers_match_in_active_root() {
        let resolver = resolver(&["/other", "/repo"], &["/other/psalm.xml", "/repo/psalm.xml"]);
        let context = WorkspaceContext::new("/repo", vec!["**/psalm.xml".to_string()]);

        let set = resolver.resolve(&context).unwrap();
        assert_eq!(set.matches.len(), 2);
        assert_eq!(set.selected, Some(PathBuf::from("/repo/psalm.xml")));
    }

    #[test]
    fn test_falls_back_to_first_match() {
        let resolver = resolver(&["/other", "/repo"], &["/other/psalm.xml.dist"]);
        let context = WorkspaceContext::new(
            "/repo",
            vec!["psalm.xml".to_string(), "psalm.xml.dist".to_string()],
        );

        let set = resolver.resolve(&context).unwrap();
        assert_eq!(set.selected, Some(PathBuf::from("/other/psalm.xml.dist")));
    }

    #[test]
    fn test_no_matches_is_not_an_error() {
        let resolver = resolver(&["/repo"], &["/repo/composer.json"]);
        let context = WorkspaceContext::new("/repo", vec!["psalm.xml".to_string()]);

        let set = resolver.resolve(&context).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.selected, None);
        assert_eq!(set.patterns, vec!["psalm.xml".to_string()]);
    }

    #[test]
    fn test_empty_patterns_rejected() {
        let resolver = resolver(&["/repo"], &["/repo/psalm.xml"]);
        let context = WorkspaceContext::new("/repo", Vec::new());
        assert_eq!(
            resolver.resolve(&context),
            Err(ResolveError::NoPatternsConfigured)
        );
    }

    #[test]
    fn test_invalid_pattern_named() {
        let err = build_matcher(&["psalm.xml".to_string(), "[unclosed".to_string()]).unwrap_err();
        match err {
            ResolveError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "[unclosed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let matcher = build_matcher(&["*.xml".to_string()]).unwrap();
        assert!(matcher.is_match("psalm.xml"));
        assert!(!matcher.is_match("config/psalm.xml"));
    }

    #[test]
    fn test_glob_alternation() {
        assert_eq!(
            glob_alternation(&["psalm.xml".to_string(), "psalm.xml.dist".to_string()]),
            "{psalm.xml,psalm.xml.dist}"
        );
    }

    #[test]
    fn test_normalize_backslash_paths() {
        assert_eq!(
            normalize_search_path("/c:/work/app/psalm.xml", true),
            PathBuf::from("c:\\work\\app\\psalm.xml")
        );
        // UNC-style leading separators are real, not artifacts
        assert_eq!(
            normalize_search_path("//server/share/psalm.xml", true),
            PathBuf::from("\\\\server\\share\\psalm.xml")
        );
        assert_eq!(
            normalize_search_path("/repo/psalm.xml", false),
            PathBuf::from("/repo/psalm.xml")
        );
    }

    #[test]
    fn test_select_is_component_wise() {
        let matches = vec![
            PathBuf::from("/repo-old/psalm.xml"),
            PathBuf::from("/repo/psalm.xml"),
        ];
        assert_eq!(
            select_config(&matches, Path::new("/repo")),
            Some(PathBuf::from("/repo/psalm.xml"))
        );
    }

    fn segment() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["repo", "other", "app", "lib"]).prop_map(str::to_string)
    }

    fn match_path() -> impl Strategy<Value = PathBuf> {
        prop::collection::vec(segment(), 1..4).prop_map(|parts| {
            let mut path = PathBuf::from("/");
            for part in parts {
                path.push(part);
            }
            path.join("psalm.xml")
        })
    }

    proptest! {
        #[test]
        fn prop_selected_is_member_and_prefers_root(
            matches in prop::collection::vec(match_path(), 0..8),
            root in segment(),
        ) {
            let root = PathBuf::from("/").join(root);
            let selected = select_config(&matches, &root);

            match selected {
                None => prop_assert!(matches.is_empty()),
                Some(path) => {
                    prop_assert!(matches.contains(&path));
                    let first_inside = matches.iter().find(|m| m.starts_with(&root));
                    match first_inside {
                        Some(expected) => prop_assert_eq!(&path, expected),
                        None => prop_assert_eq!(&path, &matches[0]),
                    }
                }
            }
        }
    }
}
