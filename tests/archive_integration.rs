//! Archive fetch and expansion tests with a real zip payload.

use std::io::Write;
use std::sync::Arc;

use dictforge_core::{
    CancelToken, Database, HttpClient, Pipeline, Store, TaskFlags, WorkDir, registry,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

/// Builds an in-memory zip with the given named entries.
fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut cursor);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap();
    cursor.into_inner()
}

async fn run_dictfile_zip(server: &MockServer, store: &Store, temp: &TempDir) {
    let options = vec![
        format!("url={}/dict.zip", server.uri()),
        "zip=.txt".to_string(),
        "name=Zipped Dict".to_string(),
    ];
    let plugin: Arc<dyn dictforge_core::Plugin> =
        registry::create("dictfile", &options).unwrap().into();

    let workdir = WorkDir::new(temp.path().join("build"));
    workdir.ensure().unwrap();
    let pipeline = Pipeline::standard(
        plugin,
        store.clone(),
        workdir,
        HttpClient::new(),
        CancelToken::new(),
    );
    pipeline.run().await.unwrap();
}

#[tokio::test]
async fn test_zipped_dictionary_is_fetched_expanded_and_processed() {
    let archive = build_zip(&[
        ("data/dict.txt", b"Haus\thouse\nBaum\ttree\n" as &[u8]),
        ("readme.md", b"not dictionary data"),
    ]);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dict.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let store = Store::new(Database::new_in_memory().await.unwrap());
    let temp = TempDir::new().unwrap();
    run_dictfile_zip(&server, &store, &temp).await;

    // The archive record is fetched and expanded.
    assert_eq!(
        store
            .count_tasks_with(
                TaskFlags::ZIP_FETCHER | TaskFlags::FETCHED | TaskFlags::PROCESSED
            )
            .await
            .unwrap(),
        1
    );

    // Exactly one extracted file task: readme.md was excluded.
    assert_eq!(
        store
            .count_tasks_with(TaskFlags::FILE | TaskFlags::FETCHED)
            .await
            .unwrap(),
        1
    );

    let entries = store.entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].headword, "Haus");
    assert_eq!(entries[0].definition, "house");
    assert_eq!(entries[1].headword, "Baum");
}

#[tokio::test]
async fn test_zipped_dictionary_rerun_downloads_nothing() {
    let archive = build_zip(&[("dict.txt", b"wort\tword\n" as &[u8])]);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dict.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .expect(1)
        .mount(&server)
        .await;

    let store = Store::new(Database::new_in_memory().await.unwrap());
    let temp = TempDir::new().unwrap();
    run_dictfile_zip(&server, &store, &temp).await;
    run_dictfile_zip(&server, &store, &temp).await;

    // No duplicate file tasks, no duplicate entries, one download total.
    assert_eq!(
        store
            .count_tasks_with(TaskFlags::FILE | TaskFlags::FETCHED)
            .await
            .unwrap(),
        1
    );
    assert_eq!(store.entries().await.unwrap().len(), 1);
}
