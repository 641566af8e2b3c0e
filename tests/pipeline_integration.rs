//! End-to-end pipeline tests against a mock HTTP source.

use std::sync::Arc;

use dictforge_core::{
    CancelToken, Database, FetchMode, Frontier, HttpClient, Pipeline, Plugin, PluginError,
    SourcePolicy, Store, TaskFlags, WorkDir,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A source with a fixed set of tab-separated word pages.
struct WordPages {
    base: String,
    words: Vec<&'static str>,
    workers: usize,
    dedup: bool,
}

impl WordPages {
    fn new(base: String, words: Vec<&'static str>) -> Self {
        Self {
            base,
            words,
            workers: 2,
            dedup: false,
        }
    }
}

impl Plugin for WordPages {
    fn name(&self) -> &str {
        "word-pages"
    }

    fn metadata(&self) -> Vec<(String, String)> {
        vec![("bookname".to_string(), "Word Pages".to_string())]
    }

    fn policy(&self) -> SourcePolicy {
        SourcePolicy {
            worker_count: self.workers,
            dedup_payloads: self.dedup,
            ..SourcePolicy::default()
        }
    }

    fn frontier(&self, mode: FetchMode) -> Result<Frontier, PluginError> {
        Ok(match mode {
            FetchMode::Raw => Frontier::Fixed(
                self.words
                    .iter()
                    .map(|word| format!("{}/word/{word}", self.base))
                    .collect(),
            ),
            _ => Frontier::empty(),
        })
    }

    fn headword(&self, segment: &str) -> Result<Option<String>, PluginError> {
        Ok(segment.split_once('\t').map(|(head, _)| head.to_string()))
    }

    fn definition(&self, segment: &str) -> Result<Option<String>, PluginError> {
        Ok(segment.split_once('\t').map(|(_, def)| def.to_string()))
    }
}

/// A source whose index page lists the real documents.
struct IndexedSource {
    base: String,
}

impl Plugin for IndexedSource {
    fn name(&self) -> &str {
        "indexed"
    }

    fn frontier(&self, mode: FetchMode) -> Result<Frontier, PluginError> {
        Ok(match mode {
            FetchMode::Discovery => Frontier::Fixed(vec![format!("{}/index", self.base)]),
            _ => Frontier::empty(),
        })
    }

    fn discover(&self, _locator: &str, data: &[u8]) -> Result<Vec<String>, PluginError> {
        Ok(String::from_utf8_lossy(data)
            .lines()
            .map(|line| format!("{}{line}", self.base))
            .collect())
    }

    fn headword(&self, segment: &str) -> Result<Option<String>, PluginError> {
        Ok(segment.split_once('\t').map(|(head, _)| head.to_string()))
    }

    fn definition(&self, segment: &str) -> Result<Option<String>, PluginError> {
        Ok(segment.split_once('\t').map(|(_, def)| def.to_string()))
    }
}

async fn fresh_store() -> Store {
    Store::new(Database::new_in_memory().await.unwrap())
}

fn workdir_in(temp: &TempDir) -> WorkDir {
    let workdir = WorkDir::new(temp.path().join("build"));
    workdir.ensure().unwrap();
    workdir
}

fn pipeline_for(plugin: Arc<dyn Plugin>, store: &Store, workdir: WorkDir) -> (Pipeline, CancelToken) {
    let cancel = CancelToken::new();
    let pipeline = Pipeline::standard(
        plugin,
        store.clone(),
        workdir,
        HttpClient::new(),
        cancel.clone(),
    );
    (pipeline, cancel)
}

#[tokio::test]
async fn test_pipeline_builds_glossary_from_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/word/alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"alpha\tfirst letter"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/word/beta"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"beta\tsecond letter"))
        .mount(&server)
        .await;

    let store = fresh_store().await;
    let temp = TempDir::new().unwrap();
    let plugin = Arc::new(WordPages::new(server.uri(), vec!["alpha", "beta"]));
    let (pipeline, _cancel) = pipeline_for(plugin, &store, workdir_in(&temp));

    pipeline.run().await.unwrap();

    let entries = store.entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    let headwords: Vec<&str> = entries.iter().map(|e| e.headword.as_str()).collect();
    assert!(headwords.contains(&"alpha"));
    assert!(headwords.contains(&"beta"));

    // Every task is fetched and processed.
    assert_eq!(
        store
            .count_tasks_with(TaskFlags::FETCHED | TaskFlags::PROCESSED)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_pipeline_rerun_fetches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/word/\w+$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"gamma\tthird letter"))
        .expect(1)
        .mount(&server)
        .await;

    let store = fresh_store().await;
    let temp = TempDir::new().unwrap();

    let plugin = Arc::new(WordPages::new(server.uri(), vec!["gamma"]));
    let (pipeline, _cancel) = pipeline_for(plugin.clone(), &store, workdir_in(&temp));
    pipeline.run().await.unwrap();

    // A second full run over the same store issues no HTTP requests;
    // the expect(1) above is verified when the server drops.
    let (second, _cancel) = pipeline_for(plugin, &store, workdir_in(&temp));
    second.run().await.unwrap();

    assert_eq!(store.entries().await.unwrap().len(), 1);
}

/// Serves a fixed body, cancelling the given token as a side effect.
struct CancelOnHit {
    cancel: CancelToken,
    body: &'static [u8],
}

impl wiremock::Respond for CancelOnHit {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        self.cancel.cancel();
        ResponseTemplate::new(200).set_body_bytes(self.body)
    }
}

#[tokio::test]
async fn test_pipeline_interrupted_run_resumes_without_refetching() {
    let server = MockServer::start().await;
    let first_cancel = CancelToken::new();
    Mock::given(method("GET"))
        .and(path("/word/alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"alpha\tfirst letter"))
        .expect(1)
        .mount(&server)
        .await;
    // The interrupt arrives while beta is in flight, so beta's body is
    // dropped and requested again on resume.
    Mock::given(method("GET"))
        .and(path("/word/beta"))
        .respond_with(CancelOnHit {
            cancel: first_cancel.clone(),
            body: b"beta\tsecond letter",
        })
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/word/gamma"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"gamma\tthird letter"))
        .expect(1)
        .mount(&server)
        .await;

    let store = fresh_store().await;
    let temp = TempDir::new().unwrap();
    let mut plugin = WordPages::new(server.uri(), vec!["alpha", "beta", "gamma"]);
    // One worker keeps the fetch order deterministic.
    plugin.workers = 1;
    let plugin: Arc<dyn Plugin> = Arc::new(plugin);

    let interrupted = Pipeline::standard(
        Arc::clone(&plugin),
        store.clone(),
        workdir_in(&temp),
        HttpClient::new(),
        first_cancel,
    );
    interrupted.run().await.unwrap();

    // alpha landed before the interrupt; beta and gamma are pending.
    assert_eq!(
        store.count_tasks_with(TaskFlags::FETCHED).await.unwrap(),
        1
    );
    assert!(store.entries().await.unwrap().is_empty());

    // The resumed run requests only the pending words; the expect(1)
    // on alpha is verified when the server drops.
    let (resumed, _cancel) = pipeline_for(plugin, &store, workdir_in(&temp));
    resumed.run().await.unwrap();

    assert_eq!(
        store.count_tasks_with(TaskFlags::FETCHED).await.unwrap(),
        3
    );
    assert_eq!(store.entries().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_pipeline_cancelled_before_start_does_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/word/\w+$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x\ty"))
        .expect(0)
        .mount(&server)
        .await;

    let store = fresh_store().await;
    let temp = TempDir::new().unwrap();
    let plugin = Arc::new(WordPages::new(server.uri(), vec!["alpha"]));
    let (pipeline, cancel) = pipeline_for(plugin, &store, workdir_in(&temp));

    cancel.cancel();
    pipeline.run().await.unwrap();

    assert!(store.entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pipeline_duplicate_payloads_stored_once() {
    let server = MockServer::start().await;
    // Two different locators serving byte-identical bodies.
    Mock::given(method("GET"))
        .and(path_regex(r"^/word/(alpha|beta)$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"same\tidentical body"))
        .mount(&server)
        .await;

    let store = fresh_store().await;
    let temp = TempDir::new().unwrap();
    let mut plugin = WordPages::new(server.uri(), vec!["alpha", "beta"]);
    plugin.dedup = true;
    let (pipeline, _cancel) = pipeline_for(Arc::new(plugin), &store, workdir_in(&temp));

    pipeline.run().await.unwrap();

    // One record keeps the bytes, the other is a cross-reference, and
    // only the original reaches the processor.
    assert_eq!(
        store.count_tasks_with(TaskFlags::DUPLICATE).await.unwrap(),
        1
    );
    assert_eq!(store.entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pipeline_discovery_feeds_raw_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"/doc/one\n/doc/two"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doc/one"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"one\tfirst"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doc/two"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"two\tsecond"))
        .mount(&server)
        .await;

    let store = fresh_store().await;
    let temp = TempDir::new().unwrap();
    let plugin = Arc::new(IndexedSource { base: server.uri() });
    let (pipeline, _cancel) = pipeline_for(plugin, &store, workdir_in(&temp));

    pipeline.run().await.unwrap();

    let entries = store.entries().await.unwrap();
    assert_eq!(entries.len(), 2);

    // The index page itself is marked fetched but never processed.
    assert_eq!(
        store
            .count_tasks_with(TaskFlags::URL_FETCHER | TaskFlags::FETCHED)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_pipeline_missing_pages_leave_no_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/word/alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"alpha\tfirst letter"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/word/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    struct Tolerant(WordPages);
    impl Plugin for Tolerant {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn policy(&self) -> SourcePolicy {
            SourcePolicy {
                missing_as_empty: true,
                ..self.0.policy()
            }
        }
        fn frontier(&self, mode: FetchMode) -> Result<Frontier, PluginError> {
            self.0.frontier(mode)
        }
        fn headword(&self, segment: &str) -> Result<Option<String>, PluginError> {
            self.0.headword(segment)
        }
        fn definition(&self, segment: &str) -> Result<Option<String>, PluginError> {
            self.0.definition(segment)
        }
    }

    let store = fresh_store().await;
    let temp = TempDir::new().unwrap();
    let plugin = Arc::new(Tolerant(WordPages::new(server.uri(), vec!["alpha", "ghost"])));
    let (pipeline, _cancel) = pipeline_for(plugin, &store, workdir_in(&temp));

    pipeline.run().await.unwrap();

    // Both records are fetched (one empty), only alpha yields an entry.
    assert_eq!(
        store.count_tasks_with(TaskFlags::FETCHED).await.unwrap(),
        2
    );
    let entries = store.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].headword, "alpha");
}
