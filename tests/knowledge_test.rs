mod helpers;

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use helpers::*;
use ragent::config::RetrievalConfig;
use ragent::knowledge;
use ragent::server::handler::format_search;

fn knowledge_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("bells_palsy.md"),
        "# Bell's palsy\n\nBell's palsy causes facial weakness.\n\nTreatment includes eye protection and steroids.",
    )
    .unwrap();
    std::fs::create_dir(tmp.path().join("notes")).unwrap();
    std::fs::write(tmp.path().join("notes").join("extra.txt"), "Steroids work best early.").unwrap();
    std::fs::write(tmp.path().join("image.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
    tmp
}

#[tokio::test]
async fn ingest_embeds_every_eligible_file() {
    let dir = knowledge_dir();
    let embedder = Arc::new(KeywordEmbedder::medical());
    let retriever = retriever_with(embedder.clone(), &[]).await;
    let config = RetrievalConfig {
        chunk_size: 50,
        ..Default::default()
    };

    let report = knowledge::ingest(&retriever, dir.path(), &config).await.unwrap();

    assert_eq!(report.total_files, 2);
    assert_eq!(report.embedded_count, 2);
    assert_eq!(
        report.processed_files,
        vec![PathBuf::from("bells_palsy.md"), PathBuf::from("notes/extra.txt")]
    );
    assert!(report.failed_files.is_empty());
    assert_eq!(report.degraded_chunks, 0);
    assert_eq!(report.chunks, retriever.document_count().await.unwrap());
    assert_eq!(embedder.calls(), report.chunks);
    assert!(report.chunks >= 3);

    let retrieval = retriever.retrieve("treatment", 1).await.unwrap();
    assert!(retrieval.texts()[0].contains("Treatment includes eye protection"));
}

#[tokio::test]
async fn ingested_chunks_cite_their_file() {
    let dir = knowledge_dir();
    let retriever = retriever_with(Arc::new(KeywordEmbedder::medical()), &[]).await;
    knowledge::ingest(&retriever, dir.path(), &RetrievalConfig::default())
        .await
        .unwrap();

    let retrieval = retriever.retrieve("steroids", 10).await.unwrap();
    let mut sources: Vec<_> = retrieval
        .documents
        .iter()
        .map(|d| d.source.clone().unwrap())
        .collect();
    sources.sort();
    sources.dedup();
    assert_eq!(sources, vec!["bells_palsy.md", "notes/extra.txt"]);

    let context = retrieval.context("\n---\n");
    assert!(context.contains("[source: notes/extra.txt]\nSteroids work best early."));

    let body = format_search("steroids", &retrieval, 0.3);
    assert!(body["results"]
        .as_array()
        .unwrap()
        .iter()
        .all(|hit| hit["source"] != "Unknown"));
}

#[tokio::test]
async fn degraded_embeddings_are_counted() {
    let dir = knowledge_dir();
    let retriever = retriever_with(Arc::new(FailingEmbedder::default()), &[]).await;

    let report = knowledge::ingest(&retriever, dir.path(), &RetrievalConfig::default())
        .await
        .unwrap();

    assert_eq!(report.embedded_count, 2);
    assert_eq!(report.degraded_chunks, report.chunks);
}

#[tokio::test]
async fn missing_directory_fails() {
    let retriever = retriever_with(Arc::new(KeywordEmbedder::medical()), &[]).await;
    let result = knowledge::ingest(
        &retriever,
        std::path::Path::new("/no/such/knowledge"),
        &RetrievalConfig::default(),
    )
    .await;
    assert!(result.is_err());
}
