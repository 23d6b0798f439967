use std::fs;
use std::path::Path;
use std::sync::Arc;

use psalm_supervisor::workspace::{ConfigResolver, FsWorkspace, WorkspaceContext, active_root};
use tempfile::TempDir;

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "<?xml version=\"1.0\"?><psalm/>").unwrap();
}

fn default_patterns() -> Vec<String> {
    vec!["psalm.xml".to_string(), "psalm.xml.dist".to_string()]
}

#[test]
fn test_active_root_config_wins_over_search_order() {
    let temp = TempDir::new().unwrap();
    let other = temp.path().join("other");
    let repo = temp.path().join("repo");
    touch(&other.join("psalm.xml"));
    touch(&repo.join("psalm.xml"));

    // `other` is searched first, but the focused document lives in `repo`
    let workspace = Arc::new(FsWorkspace::new(vec![other.clone(), repo.clone()]));
    let root = active_root(workspace.as_ref(), Some(&repo.join("src/Foo.php"))).unwrap();
    assert_eq!(root, repo);

    let resolver = ConfigResolver::new(workspace);
    let candidates = resolver
        .resolve(&WorkspaceContext::new(root, default_patterns()))
        .unwrap();

    assert_eq!(candidates.matches.len(), 2);
    assert_eq!(candidates.selected, Some(repo.join("psalm.xml")));
}

#[test]
fn test_falls_back_to_first_match_outside_root() {
    let temp = TempDir::new().unwrap();
    let lib = temp.path().join("lib");
    let app = temp.path().join("app");
    fs::create_dir_all(&app).unwrap();
    touch(&lib.join("psalm.xml.dist"));

    let workspace = Arc::new(FsWorkspace::new(vec![app.clone(), lib.clone()]));
    let resolver = ConfigResolver::new(workspace);
    let candidates = resolver
        .resolve(&WorkspaceContext::new(&app, default_patterns()))
        .unwrap();

    assert_eq!(candidates.selected, Some(lib.join("psalm.xml.dist")));
}

#[test]
fn test_no_matches_yields_empty_set() {
    let temp = TempDir::new().unwrap();
    touch(&temp.path().join("phpunit.xml"));

    let workspace = Arc::new(FsWorkspace::new(vec![temp.path().to_path_buf()]));
    let candidates = ConfigResolver::new(workspace)
        .resolve(&WorkspaceContext::new(temp.path(), default_patterns()))
        .unwrap();

    assert!(candidates.is_empty());
    assert_eq!(candidates.selected, None);
}

#[test]
fn test_nested_configs_need_recursive_pattern() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    touch(&root.join("packages/core/psalm.xml"));

    let workspace = Arc::new(FsWorkspace::new(vec![root.clone()]));
    let resolver = ConfigResolver::new(workspace);

    let shallow = resolver
        .resolve(&WorkspaceContext::new(&root, default_patterns()))
        .unwrap();
    assert!(shallow.is_empty());

    let deep = resolver
        .resolve(&WorkspaceContext::new(&root, vec!["**/psalm.xml".to_string()]))
        .unwrap();
    assert_eq!(deep.selected, Some(root.join("packages/core/psalm.xml")));
}

#[test]
fn test_gitignored_local_config_is_found() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    // Usual Psalm layout: the .dist file is committed, the local override ignored
    fs::write(root.join(".gitignore"), "psalm.xml\nvendor/\n").unwrap();
    touch(&root.join("psalm.xml"));
    touch(&root.join("psalm.xml.dist"));
    touch(&root.join("vendor/acme/lib/psalm.xml"));

    let workspace = Arc::new(FsWorkspace::new(vec![root.clone()]));
    let candidates = ConfigResolver::new(workspace)
        .resolve(&WorkspaceContext::new(&root, default_patterns()))
        .unwrap();

    assert_eq!(
        candidates.matches,
        vec![root.join("psalm.xml"), root.join("psalm.xml.dist")]
    );
    assert_eq!(candidates.selected, Some(root.join("psalm.xml")));

    let deep = ConfigResolver::new(Arc::new(FsWorkspace::new(vec![root.clone()])))
        .resolve(&WorkspaceContext::new(&root, vec!["**/psalm.xml".to_string()]))
        .unwrap();
    assert!(deep.matches.contains(&root.join("vendor/acme/lib/psalm.xml")));
}
