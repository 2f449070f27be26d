//! End-to-end tests for the stream -> parse -> apply -> checkpoint pipeline.
//!
//! Responses are fed through the public API in awkward chunk sizes, and the
//! on-disk backend is exercised under a temporary directory.

use std::sync::Arc;

use atelier_core::backend::{LocalBackend, ProjectBackend};
use atelier_core::stream::{self, CancelFlag, CollectingSink, StreamingPatchParser};
use atelier_core::{
    CheckpointManager, Config, DiffStatus, Error, FileRecord, FileType, ProjectSession,
    StreamOperation, TurnStatus, VfsPath, VirtualFileStore, checkpoint, patch,
};

const BUTTON: &str = "Here is a button.\n```html\n<!-- /index.html -->\n<button>Hi</button>\n```\nRingkasan: done.\n```json\n{\"files\":[{\"action\":\"update\",\"path\":\"/index.html\",\"type\":\"html\",\"content\":\"<button>Hi</button>\"}]}\n```";

fn p(path: &str) -> VfsPath {
    VfsPath::new(path).unwrap()
}

fn chunked(text: &str, size: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<_>>()
        .chunks(size)
        .map(|c| c.iter().collect())
        .collect()
}

#[test]
fn button_scenario_through_parser_and_applier() {
    for size in [1, 3, 16, 1000] {
        let mut parser = StreamingPatchParser::new(1 << 20);
        for chunk in chunked(BUTTON, size) {
            parser.push(&chunk);
            // Raw file content never shows up in the prose while streaming.
            assert!(!parser.view().narrative.contains("<button>"));
        }
        let view = parser.view();
        assert_eq!(view.completed_blocks.len(), 1);
        assert_eq!(view.completed_blocks[0].path, p("/index.html"));
        assert_eq!(view.completed_blocks[0].language, "html");
        assert_eq!(view.completed_blocks[0].content, "<button>Hi</button>");
        assert_eq!(view.narrative, "Here is a button.\nRingkasan: done.");
        assert!(view.live_block.is_none());

        let ops = parser.final_operations().unwrap();
        assert_eq!(ops.len(), 1);
        let outcome = patch::apply(&VirtualFileStore::new(), &ops, None);
        assert_eq!(outcome.affected_paths, vec![p("/index.html")]);
        assert_eq!(outcome.store.list_visible().len(), 1);
        assert_eq!(
            outcome.store.get(&p("/index.html")).unwrap().content,
            "<button>Hi</button>"
        );
    }
}

#[test]
fn rescan_is_idempotent_for_every_prefix() {
    for end in 0..=BUTTON.len() {
        let prefix = &BUTTON[..end];
        assert_eq!(stream::scan(prefix), stream::scan(prefix));
    }
}

#[test]
fn trailing_commas_tolerated_but_broken_json_is_reported() {
    let tolerant = "Done.\n```json\n{\"files\": [\n  {\"action\": \"delete\", \"path\": \"/old.css\"},\n],\n}\n```";
    let ops = stream::final_operations(tolerant).unwrap();
    assert_eq!(ops.len(), 1);

    let broken = "Oops.\n```json\n{\"files\": [{\"action\": \"create\", \"path\": \"/a.txt\", \"content\": \"unterminated}]}\n```";
    match stream::final_operations(broken) {
        Err(Error::MalformedPatch { raw, .. }) => {
            assert!(raw.contains("\"unterminated}]}"));
        }
        other => panic!("expected malformed patch, got {:?}", other),
    }
    assert_eq!(stream::scan(broken).narrative, "Oops.");
}

#[test]
fn folder_delete_leaves_nothing_nested() {
    let mut store = VirtualFileStore::new();
    for path in ["/site/a.html", "/site/css/b.css", "/site/css/deep/c.css", "/sitemap.xml"] {
        let path = p(path);
        let file_type = FileType::from_path(&path);
        store.set(FileRecord::new(path, file_type, "x")).unwrap();
    }
    store.create_folder(&p("/site/empty")).unwrap();

    store.delete_folder(&p("/site"));
    assert!(
        store
            .iter()
            .all(|r| r.path.as_str() != "/site" && !r.path.as_str().starts_with("/site/"))
    );
    assert!(store.contains(&p("/sitemap.xml")));
}

#[test]
fn duplicate_naming_sequence() {
    let mut store = VirtualFileStore::new();
    store.create(&p("/a/b.txt"), FileType::Plaintext, "b").unwrap();
    store.create(&p("/a/b-copy.txt"), FileType::Plaintext, "").unwrap();
    assert_eq!(store.duplicate(&p("/a/b.txt")).unwrap(), p("/a/b-copy-2.txt"));
    assert_eq!(store.duplicate(&p("/a/b.txt")).unwrap(), p("/a/b-copy-3.txt"));
    assert_eq!(store.get(&p("/a/b-copy-3.txt")).unwrap().content, "b");
}

#[test]
fn checkpoint_isolation_round_trip_and_diff() {
    let mut store = VirtualFileStore::new();
    store.create(&p("/a.css"), FileType::Css, "body{}").unwrap();
    let taken = store.snapshot();

    let mut manager = CheckpointManager::new();
    let id = manager.create(&store, "x").id;

    store.write_content(&p("/a.css"), "body{color:red}").unwrap();
    store.create(&p("/b.js"), FileType::Javascript, "x").unwrap();

    assert_eq!(manager.get(&id).unwrap().files[&p("/a.css")].content, "body{}");
    assert_eq!(manager.restore(&id).unwrap(), taken);

    let entries = checkpoint::diff(manager.get(&id), &store);
    let summary: Vec<(&str, DiffStatus)> = entries
        .iter()
        .map(|e| (e.path.as_str(), e.status))
        .collect();
    assert_eq!(
        summary,
        vec![("/a.css", DiffStatus::Modified), ("/b.js", DiffStatus::Added)]
    );
}

#[tokio::test]
async fn session_on_local_backend_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let backend: Arc<dyn ProjectBackend> = Arc::new(LocalBackend::new(tmp.path().to_path_buf()));

    let mut session = ProjectSession::open("site", backend.clone(), Config::default())
        .await
        .unwrap();
    let chunks: Vec<Result<String, String>> =
        chunked(BUTTON, 5).into_iter().map(Ok).collect();
    let mut sink = CollectingSink::new();
    let report = session
        .run_turn(futures_util::stream::iter(chunks), &CancelFlag::new(), &mut sink)
        .await
        .unwrap();
    assert!(matches!(report.status, TurnStatus::Applied { .. }));
    assert_eq!(sink.live_files, vec![p("/index.html")]);
    session.save_now().await.unwrap();

    let reopened = ProjectSession::open("site", backend, Config::default())
        .await
        .unwrap();
    assert_eq!(
        reopened.store().get(&p("/index.html")).unwrap().content,
        "<button>Hi</button>"
    );
    assert_eq!(reopened.checkpoints().len(), 1);
    assert_eq!(reopened.checkpoints()[0].name, "AI: Here is a button.");
    assert!(tmp.path().join("site").join("project.json").exists());
}

#[tokio::test]
async fn truncated_turn_never_reaches_the_store() {
    let tmp = tempfile::tempdir().unwrap();
    let backend: Arc<dyn ProjectBackend> = Arc::new(LocalBackend::new(tmp.path().to_path_buf()));
    let config = Config {
        max_stream_bytes: BUTTON.find("```json").unwrap(),
        ..Config::default()
    };

    let mut session = ProjectSession::open("site", backend.clone(), config)
        .await
        .unwrap();
    session
        .create_file(&p("/index.html"), FileType::Html, "<p>old</p>")
        .unwrap();
    session.save_now().await.unwrap();

    let chunks: Vec<Result<String, String>> = chunked(BUTTON, 7).into_iter().map(Ok).collect();
    let report = session
        .run_turn(
            futures_util::stream::iter(chunks),
            &CancelFlag::new(),
            &mut CollectingSink::new(),
        )
        .await
        .unwrap();
    assert!(report.truncated);
    assert!(matches!(
        report.status,
        TurnStatus::Failed(Error::StreamTruncated { .. })
    ));
    assert_eq!(
        session.store().get(&p("/index.html")).unwrap().content,
        "<p>old</p>"
    );

    let reopened = ProjectSession::open("site", backend, Config::default())
        .await
        .unwrap();
    assert_eq!(
        reopened.store().get(&p("/index.html")).unwrap().content,
        "<p>old</p>"
    );
    assert!(reopened.checkpoints().is_empty());
}

#[test]
fn a_path_is_a_file_or_a_folder_never_both() {
    let mut store = VirtualFileStore::new();
    store.create(&p("/a.txt"), FileType::Plaintext, "a").unwrap();
    store.create(&p("/d/x.js"), FileType::Javascript, "x").unwrap();

    assert!(matches!(
        store.create(&p("/a.txt/b.txt"), FileType::Plaintext, ""),
        Err(Error::PathConflict { .. })
    ));
    let ops = vec![
        StreamOperation::update(p("/d"), FileType::Plaintext, "onto a folder"),
        StreamOperation::update(p("/a.txt/c.txt"), FileType::Plaintext, "under a file"),
    ];
    let outcome = patch::apply(&store, &ops, None);
    assert_eq!(outcome.summary.skipped, 2);
    for record in outcome.store.iter() {
        assert!(
            !outcome.store.folder_exists(&record.path),
            "{} is both a file and a folder",
            record.path
        );
    }
}
