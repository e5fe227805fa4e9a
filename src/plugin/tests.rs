use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use tempfile::TempDir;

use super::*;
use crate::asset::{Asset, AssetInfo, AssetStore, MemoryAssetStore};
use crate::cache::DiskCache;
use crate::compilation::Compilation;
use crate::error::CallbackKind;
use crate::fs::{FileSystem, MemoryFs};
use crate::hash::ContentHash;
use crate::pattern::{GlobOptions, Transform, TransformAll};

const ROOT: &str = "/project";

struct Pass {
    report: PassReport,
    errors: Vec<CopyError>,
    dependencies: Dependencies,
}

async fn run_pass(plugin: &CopyPlugin, fs: &Arc<MemoryFs>, store: &mut MemoryAssetStore) -> Pass {
    let mut compilation =
        Compilation::new(ROOT, Arc::clone(fs) as Arc<dyn FileSystem>, store).with_output_path("/project/dist");
    let report = plugin.run(&mut compilation).await;
    Pass {
        report,
        errors: std::mem::take(&mut compilation.errors),
        dependencies: std::mem::take(&mut compilation.dependencies),
    }
}

fn plugin(patterns: Vec<Pattern>) -> CopyPlugin {
    CopyPlugin::new(patterns, CopyOptions::default()).unwrap()
}

fn tree() -> Arc<MemoryFs> {
    let fs = MemoryFs::new();
    fs.write("/project/file.txt", "hello");
    fs.write("/project/directory/b.txt", "b");
    fs.write("/project/directory/.dotfile", "dot");
    fs.write("/project/directory/debug.log", "log");
    fs.write("/project/directory/nested/a.txt", "a");
    fs.write("/project/directory/nested/deep/trace.log", "trace");
    Arc::new(fs)
}

async fn copy(patterns: Vec<Pattern>) -> (MemoryAssetStore, Pass) {
    let fs = tree();
    let mut store = MemoryAssetStore::new();
    let pass = run_pass(&plugin(patterns), &fs, &mut store).await;
    (store, pass)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_single_file() {
    let (store, pass) = copy(vec![Pattern::from("file.txt")]).await;

    assert!(pass.errors.is_empty());
    assert_eq!(store.names(), vec!["file.txt"]);
    assert_eq!(store.text("file.txt").as_deref(), Some("hello"));

    let info = &store.get("file.txt").unwrap().info;
    assert!(info.copied);
    assert_eq!(info.source_filename.as_deref(), Some("file.txt"));
    assert_eq!(pass.report.stage, PassStage::Emitted);
    assert_eq!(pass.report.emitted, vec!["file.txt"]);
}

#[tokio::test]
async fn test_directory_flatten() {
    let (store, pass) = copy(vec![Pattern::new("directory").flatten(true).ignore("*.log")]).await;

    assert!(pass.errors.is_empty());
    assert_eq!(store.names(), vec![".dotfile", "a.txt", "b.txt"]);
}

#[tokio::test]
async fn test_directory_mirrors_structure() {
    let (store, _) = copy(vec![Pattern::new("directory").to("static")]).await;
    assert_eq!(
        store.names(),
        vec![
            "static/.dotfile",
            "static/b.txt",
            "static/debug.log",
            "static/nested/a.txt",
            "static/nested/deep/trace.log",
        ]
    );
}

#[tokio::test]
async fn test_ignore_glob_at_any_depth() {
    let (store, pass) = copy(vec![Pattern::new("directory/**/*").ignore("*.log")]).await;

    assert!(pass.errors.is_empty());
    assert_eq!(store.names(), vec!["directory/b.txt", "directory/nested/a.txt"]);
}

#[tokio::test]
async fn test_missing_source_reports_one_error() {
    let fs = Arc::new(MemoryFs::new());
    let mut store = MemoryAssetStore::new();
    let pass = run_pass(&plugin(vec![Pattern::from("nope.txt")]), &fs, &mut store).await;

    assert!(store.is_empty());
    assert_eq!(pass.errors.len(), 1);
    assert!(pass.errors[0].is_missing());
    assert!(pass.errors[0].to_string().contains("nope.txt"));
}

#[tokio::test]
async fn test_missing_source_suppressed() {
    let (store, pass) = copy(vec![
        Pattern::new("nope.txt").no_error_on_missing(true),
        Pattern::new("nowhere/**/*.css").no_error_on_missing(true),
        Pattern::from("file.txt"),
    ])
    .await;

    assert!(pass.errors.is_empty());
    assert_eq!(store.names(), vec!["file.txt"]);
}

#[tokio::test]
async fn test_glob_without_matches_is_error() {
    let (store, pass) = copy(vec![Pattern::glob("directory/*.css")]).await;
    assert!(store.is_empty());
    assert!(matches!(pass.errors.as_slice(), [CopyError::GlobNoMatch { .. }]));
}

#[tokio::test]
async fn test_filtered_out_is_error() {
    let (store, pass) = copy(vec![Pattern::new("directory/*.txt").filter(|_| Ok(false))]).await;
    assert!(store.is_empty());
    assert!(matches!(pass.errors.as_slice(), [CopyError::FilteredOut { .. }]));
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_idempotence() {
    let fs = tree();
    let plugin = plugin(vec![
        Pattern::new("directory").to("copied"),
        Pattern::new("file.txt").to("[name].[contenthash:8].[ext]"),
    ]);

    let mut first = MemoryAssetStore::new();
    let mut second = MemoryAssetStore::new();
    run_pass(&plugin, &fs, &mut first).await;
    run_pass(&plugin, &fs, &mut second).await;

    assert_eq!(first.names(), second.names());
    for name in first.names() {
        assert_eq!(first.get(name).unwrap().source, second.get(name).unwrap().source);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_priority_law_independent_of_completion_order() {
    let slow = |delay: u64, text: &'static str| {
        Transform::new_async(format!("slow-{text}"), move |_, _| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, anyhow::Error>(text.as_bytes().to_vec())
        })
    };

    for (high_delay, low_delay) in [(50, 0), (0, 50)] {
        let (store, pass) = copy(vec![
            Pattern::new("file.txt").priority(10).transform(slow(high_delay, "high")),
            Pattern::new("file.txt").priority(1).transform(slow(low_delay, "low")),
        ])
        .await;

        assert!(pass.errors.is_empty());
        assert_eq!(store.text("file.txt").as_deref(), Some("high"));
    }
}

#[tokio::test]
async fn test_equal_priority_later_declaration_wins() {
    let (store, _) = copy(vec![
        Pattern::new("file.txt").transform(Transform::new("first", |_, _| Ok(b"first".to_vec()))),
        Pattern::new("file.txt").transform(Transform::new("second", |_, _| Ok(b"second".to_vec()))),
    ])
    .await;
    assert_eq!(store.text("file.txt").as_deref(), Some("second"));
}

#[tokio::test]
async fn test_force_law() {
    let fs = tree();
    let existing = || Asset::new("existing", AssetInfo::default());

    let mut store = MemoryAssetStore::new();
    store.set("file.txt", existing()).unwrap();
    let pass = run_pass(&plugin(vec![Pattern::from("file.txt")]), &fs, &mut store).await;
    assert_eq!(store.text("file.txt").as_deref(), Some("existing"));
    assert_eq!(pass.report.skipped_existing, vec!["file.txt"]);

    let mut store = MemoryAssetStore::new();
    store.set("file.txt", existing()).unwrap();
    let pass = run_pass(
        &plugin(vec![Pattern::from("file.txt").force(true)]),
        &fs,
        &mut store,
    )
    .await;
    assert_eq!(store.text("file.txt").as_deref(), Some("hello"));
    assert_eq!(pass.report.updated, vec!["file.txt"]);

    // A forced candidate that loses on priority does not overwrite
    let mut store = MemoryAssetStore::new();
    store.set("file.txt", existing()).unwrap();
    run_pass(
        &plugin(vec![
            Pattern::from("file.txt").force(true),
            Pattern::from("file.txt").priority(5),
        ]),
        &fs,
        &mut store,
    )
    .await;
    assert_eq!(store.text("file.txt").as_deref(), Some("existing"));
}

#[tokio::test]
async fn test_template_contenthash_round_trip() {
    let fs = Arc::new(MemoryFs::new());
    fs.write("/project/file.txt", "abc");
    let plugin = plugin(vec![Pattern::new("file.txt").to("[name]-[contenthash:6].[ext]")]);

    let mut first = MemoryAssetStore::new();
    let mut second = MemoryAssetStore::new();
    run_pass(&plugin, &fs, &mut first).await;
    run_pass(&plugin, &fs, &mut second).await;

    let names = first.names();
    assert_eq!(names.len(), 1);
    assert!(Regex::new(r"^file-[0-9a-f]{6}\.txt$").unwrap().is_match(names[0]));
    assert_eq!(names[0], format!("file-{}.txt", ContentHash::of(b"abc").short(6)));
    assert_eq!(first.names(), second.names());
    assert!(first.get(names[0]).unwrap().info.immutable);
}

#[tokio::test]
async fn test_glob_and_directory_forms_are_equivalent() {
    let (dir_store, _) = copy(vec![Pattern::new("directory")]).await;
    let (glob_store, _) = copy(vec![Pattern::new("directory/**/*").glob_options(GlobOptions {
        dot: Some(true),
        ..GlobOptions::default()
    })])
    .await;

    let from_glob: Vec<&str> = glob_store
        .names()
        .into_iter()
        .filter_map(|name| name.strip_prefix("directory/"))
        .collect();
    assert_eq!(dir_store.names(), from_glob);
}

// ============================================================================
// Dependencies
// ============================================================================

#[tokio::test]
async fn test_dependencies_are_registered() {
    let (_, pass) = copy(vec![
        Pattern::from("file.txt"),
        Pattern::from("directory"),
        Pattern::new("directory/nested/*.txt"),
    ])
    .await;

    let deps = pass.dependencies;
    assert!(deps.files.contains(Path::new("/project/file.txt")));
    assert!(deps.files.contains(Path::new("/project/directory/nested/a.txt")));
    assert!(deps.contexts.contains(Path::new("/project/directory")));
    assert!(deps.contexts.contains(Path::new("/project/directory/nested")));
}

// ============================================================================
// Errors and isolation
// ============================================================================

#[tokio::test]
async fn test_absolute_to_without_output_root() {
    let fs = tree();
    let mut store = MemoryAssetStore::new();
    let plugin = plugin(vec![
        Pattern::new("file.txt").to("/elsewhere/file.txt"),
        Pattern::new("directory/b.txt"),
    ]);
    let mut compilation = Compilation::new(ROOT, Arc::clone(&fs) as Arc<dyn FileSystem>, &mut store);
    plugin.run(&mut compilation).await;
    let errors = std::mem::take(&mut compilation.errors);
    drop(compilation);

    assert!(matches!(errors.as_slice(), [CopyError::OutputPath { .. }]));
    assert_eq!(store.names(), vec!["b.txt"]);
}

#[tokio::test]
async fn test_absolute_to_inside_output_root() {
    let (store, pass) = copy(vec![Pattern::new("file.txt").to("/project/dist/static/")]).await;
    assert!(pass.errors.is_empty());
    assert_eq!(store.names(), vec!["static/file.txt"]);
}

#[tokio::test]
async fn test_callback_error_is_scoped_to_file() {
    let (store, pass) = copy(vec![Pattern::new("directory/**/*.txt").transform(Transform::new(
        "picky",
        |data, path| {
            if path.ends_with("b.txt") {
                anyhow::bail!("cannot transform b");
            }
            Ok(data)
        },
    ))])
    .await;

    assert_eq!(store.names(), vec!["directory/nested/a.txt"]);
    assert!(matches!(
        pass.errors.as_slice(),
        [CopyError::Callback { kind: CallbackKind::Transform, .. }]
    ));
}

#[tokio::test]
async fn test_panicking_callback_is_isolated() {
    let (store, pass) = copy(vec![
        Pattern::new("file.txt").transform_path(|_, _| panic!("boom")),
        Pattern::new("directory/b.txt"),
    ])
    .await;

    assert_eq!(store.names(), vec!["b.txt"]);
    assert!(matches!(pass.errors.as_slice(), [CopyError::Task { index: 0, .. }]));
}

// ============================================================================
// Features
// ============================================================================

#[tokio::test]
async fn test_transform_all_combines_pattern_files() {
    let (store, pass) = copy(vec![
        Pattern::new("directory/**/*.txt")
            .to("bundle.txt")
            .transform_all(TransformAll::new("concat", |inputs| {
                let names: Vec<String> = inputs.iter().map(|input| input.source_filename.clone()).collect();
                Ok(names.join(",").into_bytes())
            })),
    ])
    .await;

    assert!(pass.errors.is_empty());
    assert_eq!(store.names(), vec!["bundle.txt"]);
    assert_eq!(
        store.text("bundle.txt").as_deref(),
        Some("directory/b.txt,directory/nested/a.txt")
    );
}

#[tokio::test]
async fn test_low_concurrency_completes() {
    let plugin = CopyPlugin::new(
        vec![
            Pattern::new("directory"),
            Pattern::new("directory/**/*.txt")
                .to("all.txt")
                .transform_all(TransformAll::new("count", |inputs| {
                    Ok(inputs.len().to_string().into_bytes())
                })),
        ],
        CopyOptions::default().concurrency(1),
    )
    .unwrap();

    let fs = tree();
    let mut store = MemoryAssetStore::new();
    let pass = run_pass(&plugin, &fs, &mut store).await;
    assert!(pass.errors.is_empty());
    assert_eq!(store.len(), 6);
    assert_eq!(store.text("all.txt").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_cached_transform_survives_plugin_instances() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let make = |calls: Arc<AtomicUsize>| {
        let cache = Arc::new(DiskCache::new(dir.path()));
        CopyPlugin::new(
            vec![Pattern::new("file.txt").transform(
                Transform::new("upper", move |data, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(data.to_ascii_uppercase())
                })
                .cache(true),
            )],
            CopyOptions::default().cache(cache),
        )
        .unwrap()
    };

    let fs = tree();
    for _ in 0..2 {
        let mut store = MemoryAssetStore::new();
        run_pass(&make(Arc::clone(&calls)), &fs, &mut store).await;
        assert_eq!(store.text("file.txt").as_deref(), Some("HELLO"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_info_and_test_captures() {
    let mut extra = Map::new();
    extra.insert("minimized".into(), Value::Bool(true));

    let (store, pass) = copy(vec![
        Pattern::new("directory/nested/a.txt")
            .test(r"([^/]+)/([^/]+)\.txt$")
            .to("[1]-[2].[ext]")
            .info(extra),
        Pattern::new("file.txt").to("named.txt").info_fn(|input| {
            let mut map = Map::new();
            map.insert("from".into(), Value::String(input.source_filename));
            map
        }),
    ])
    .await;

    assert!(pass.errors.is_empty());
    assert_eq!(store.names(), vec!["named.txt", "nested-a.txt"]);
    assert_eq!(store.get("nested-a.txt").unwrap().info.extra["minimized"], true);
    assert_eq!(store.get("named.txt").unwrap().info.extra["from"], "file.txt");
}

#[tokio::test]
async fn test_rebuild_with_same_store() {
    let fs = tree();
    let plugin = plugin(vec![Pattern::new("directory/*.txt"), Pattern::from("file.txt")]);
    let mut store = MemoryAssetStore::new();

    assert!(plugin.written().is_empty());
    let first = run_pass(&plugin, &fs, &mut store).await;
    assert_eq!(first.report.emitted.len(), 2);
    assert_eq!(plugin.written().len(), 2);
    assert_eq!(plugin.written().get("file.txt"), Some(ContentHash::of(b"hello")));

    fs.write("/project/file.txt", "changed");
    let second = run_pass(&plugin, &fs, &mut store).await;
    assert_eq!(second.report.updated, vec!["file.txt"]);
    assert_eq!(second.report.unchanged, vec!["directory/b.txt"]);
    assert_eq!(store.text("file.txt").as_deref(), Some("changed"));
}

#[tokio::test]
async fn test_host_asset_survives_later_pass() {
    let fs = tree();
    let plugin = plugin(vec![Pattern::from("file.txt")]);
    let mut first = MemoryAssetStore::new();
    run_pass(&plugin, &fs, &mut first).await;

    fs.write("/project/file.txt", "changed");
    let mut second = MemoryAssetStore::new();
    second.set("file.txt", Asset::new("host-owned", AssetInfo::default())).unwrap();
    let pass = run_pass(&plugin, &fs, &mut second).await;

    assert_eq!(second.text("file.txt").as_deref(), Some("host-owned"));
    assert_eq!(pass.report.skipped_existing, vec!["file.txt"]);
    assert!(pass.report.updated.is_empty());
}

#[tokio::test]
async fn test_host_rewrite_is_not_reported_unchanged() {
    let fs = tree();
    let plugin = plugin(vec![Pattern::from("file.txt")]);
    let mut store = MemoryAssetStore::new();
    run_pass(&plugin, &fs, &mut store).await;

    store.update("file.txt", Asset::new("host-rewrite", AssetInfo::default())).unwrap();
    let pass = run_pass(&plugin, &fs, &mut store).await;

    assert!(pass.report.unchanged.is_empty());
    assert_eq!(pass.report.skipped_existing, vec!["file.txt"]);
    assert_eq!(store.text("file.txt").as_deref(), Some("host-rewrite"));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_construction_validation() {
    let invalid = [
        (vec![], CopyOptions::default()),
        (vec![Pattern::new("")], CopyOptions::default()),
        (vec![Pattern::glob("  ")], CopyOptions::default()),
        (vec![Pattern::from("file.txt")], CopyOptions::default().concurrency(0)),
        (
            vec![Pattern::from("file.txt").transform_all(TransformAll::new("x", |_| Ok(Vec::new())))],
            CopyOptions::default(),
        ),
        (vec![Pattern::from("file.txt").test("(")], CopyOptions::default()),
        (vec![Pattern::from("file.txt").ignore("{a")], CopyOptions::default()),
    ];

    for (patterns, options) in invalid {
        let err = CopyPlugin::new(patterns, options).unwrap_err();
        assert!(matches!(err, CopyError::Validation(_)), "{err}");
    }
}
