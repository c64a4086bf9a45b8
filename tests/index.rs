use docs_mcp::config::DocsConfig;
use docs_mcp::index::DocsIndex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config_for(root: &Path) -> DocsConfig {
    DocsConfig {
        workspace_root: root.to_path_buf(),
        ..DocsConfig::default()
    }
}

#[tokio::test]
async fn test_routes_from_paths_and_front_matter() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "content/docs/index.mdx", "Home");
    write(root, "content/docs/guides/index.mdx", "Guides");
    write(root, "content/docs/guides/deploy.mdx", "Deploy");
    write(root, "content/docs/old.mdx", "---\nroute: /renamed\n---\nOld");
    write(root, "content/docs/slugged.mdx", "---\nslug: topics/slugged\n---\nSlug");

    let index = DocsIndex::new(config_for(root));
    let stats = index.rebuild().await.unwrap();
    assert_eq!(stats.documents, 5);

    let routes: Vec<String> = index.list_routes(None).into_iter().map(|r| r.route).collect();
    assert_eq!(
        routes,
        vec!["/", "/guides", "/guides/deploy", "/renamed", "/topics/slugged"]
    );
    assert_eq!(index.get_by_route("guides/deploy").unwrap().title, "deploy");
}

#[tokio::test]
async fn test_front_matter_routes_can_be_disabled() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "content/docs/old.mdx", "---\nroute: /renamed\n---\nOld");

    let config = DocsConfig {
        use_frontmatter_routes: false,
        ..config_for(root)
    };
    let index = DocsIndex::new(config);
    index.rebuild().await.unwrap();
    assert!(index.get_by_route("/old").is_some());
    assert!(index.get_by_route("/renamed").is_none());
}

#[tokio::test]
async fn test_excluded_routes_are_invisible_everywhere() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "content/docs/public.mdx", "---\ntitle: Public\n---\nshared keyword");
    write(root, "content/docs/drafts/wip.mdx", "---\ntitle: WIP\n---\nshared keyword");

    let config = DocsConfig {
        exclude_routes: vec!["/drafts/**".to_string()],
        ..config_for(root)
    };
    let index = DocsIndex::new(config);
    let stats = index.rebuild().await.unwrap();
    assert_eq!(stats.excluded, 1);

    assert_eq!(index.list_routes(None).len(), 1);
    assert!(index.get_by_route("/drafts/wip").is_none());
    assert!(index.get_by_file_path("content/docs/drafts/wip.mdx").is_none());
    let hits = index.search("shared keyword", 25);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].route, "/public");
}

#[tokio::test]
async fn test_resolved_body_has_no_resolvable_includes() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "content/docs/page.mdx", "A <include>parts/b.mdx</include> <include>parts/missing.mdx</include>");
    write(root, "content/docs/parts/b.mdx", "B <include>c.mdx</include>");
    write(root, "content/docs/parts/c.mdx", "C");

    let config = DocsConfig {
        glob: "content/docs/page.mdx".to_string(),
        ..config_for(root)
    };
    let index = DocsIndex::new(config);
    let stats = index.rebuild().await.unwrap();
    let page = index.get_by_route("/page").unwrap();

    assert_eq!(page.resolved_body, "A B C <include>parts/missing.mdx</include>");
    assert_eq!(page.raw_body, "A <include>parts/b.mdx</include> <include>parts/missing.mdx</include>");
    assert_eq!(stats.warnings.len(), 1);

    // Resolving again changes nothing
    let again = docs_mcp::include::resolve_includes(&page.resolved_body, &root.join("content/docs/page.mdx"));
    assert_eq!(again.body, page.resolved_body);
}

#[tokio::test]
async fn test_include_cycle_does_not_hang_rebuild() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "content/docs/a.mdx", "A <include>b.mdx</include>");
    write(root, "content/docs/b.mdx", "B <include>a.mdx</include>");

    let index = DocsIndex::new(config_for(root));
    let stats = index.rebuild().await.unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(
        index.get_by_route("/a").unwrap().resolved_body,
        "A B <include>a.mdx</include>"
    );
    assert_eq!(
        index.get_by_route("/b").unwrap().resolved_body,
        "B A <include>b.mdx</include>"
    );
}

#[tokio::test]
async fn test_duplicate_routes_last_wins() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "content/docs/a.mdx", "---\nroute: /same\ntitle: First\n---\none");
    write(root, "content/docs/b.mdx", "---\nroute: /same\ntitle: Second\n---\ntwo");

    let index = DocsIndex::new(config_for(root));
    let stats = index.rebuild().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(index.get_by_route("/same").unwrap().title, "Second");
    assert!(stats.warnings.iter().any(|w| w.contains("duplicate route")));
}

#[tokio::test]
async fn test_reindex_picks_up_changes() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "content/docs/one.mdx", "first page");

    let index = DocsIndex::new(config_for(root));
    index.rebuild().await.unwrap();
    assert!(index.search("second", 8).is_empty());

    write(root, "content/docs/two.mdx", "second page");
    fs::remove_file(root.join("content/docs/one.mdx")).unwrap();
    let stats = index.rebuild().await.unwrap();

    assert_eq!(stats.documents, 1);
    assert_eq!(index.search("second", 8)[0].route, "/two");
    assert!(index.get_by_route("/one").is_none());
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_snapshot() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("workspace");
    write(&root, "content/docs/one.mdx", "kept");

    let index = DocsIndex::new(config_for(&root));
    index.rebuild().await.unwrap();
    fs::remove_dir_all(&root).unwrap();

    assert!(index.rebuild().await.is_err());
    assert_eq!(index.len(), 1);
    assert_eq!(index.search("kept", 8).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_searches_during_rebuild_see_whole_snapshots() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    for i in 0..3 {
        write(&root, &format!("content/docs/base{}.mdx", i), "needle");
    }

    let index = Arc::new(DocsIndex::new(config_for(&root)));
    index.rebuild().await.unwrap();

    for i in 0..2 {
        write(&root, &format!("content/docs/extra{}.mdx", i), "needle");
    }

    let rebuilder = {
        let index = index.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                index.rebuild().await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let index = index.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let snapshot = index.snapshot();
                let hits = snapshot.search("needle", 25);
                assert_eq!(hits.len(), snapshot.len());
                assert!(hits.len() == 3 || hits.len() == 5, "partial snapshot: {}", hits.len());
                tokio::task::yield_now().await;
            }
        }));
    }

    rebuilder.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(index.len(), 5);
}

#[tokio::test]
async fn test_hidden_directories_skipped_unless_enabled() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "content/docs/visible.mdx", "v");
    write(root, "content/docs/.hidden/secret.mdx", "h");

    let index = DocsIndex::new(config_for(root));
    assert_eq!(index.rebuild().await.unwrap().documents, 1);

    let index = DocsIndex::new(DocsConfig {
        include_hidden: true,
        ..config_for(root)
    });
    assert_eq!(index.rebuild().await.unwrap().documents, 2);
}
