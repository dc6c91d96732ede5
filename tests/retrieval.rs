//! End-to-end retrieval over the bundled roster.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use staffing_query::search::CachedEmbedder;
use staffing_query::{
    responder, Embedder, Error, HashEmbedder, IndexKind, IndexSettings, Metric, RetrievalEngine,
    RetrievalSettings, Roster,
};

fn bundled_roster_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/employees.json")
}

async fn engine_with(settings: RetrievalSettings) -> RetrievalEngine {
    let roster = Roster::load(bundled_roster_path()).unwrap();
    RetrievalEngine::build(roster, Arc::new(HashEmbedder::new(384)), settings)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_bundled_roster_loads() {
    let roster = Roster::load(bundled_roster_path()).unwrap();
    assert_eq!(roster.len(), 15);
    assert_eq!(roster.employees()[0].name, "Alice Johnson");
}

#[tokio::test]
async fn test_skill_queries_find_the_specialist() {
    let engine = engine_with(RetrievalSettings::default()).await;

    let cases = [
        ("Python machine learning", "Alice Johnson"),
        ("Kubernetes Terraform AWS cloud", "Eve Martinez"),
        ("Rust C++ embedded firmware", "Farid Haddad"),
        ("mobile app Swift Kotlin", "Hiro Tanaka"),
        ("Go gRPC Redis", "Nikolai Ivanov"),
    ];
    for (query, expected) in cases {
        let hits = engine.retrieve(query, Some(1), None).await.unwrap();
        assert_eq!(hits[0].name, expected, "query: {}", query);
    }
}

#[tokio::test]
async fn test_partitioned_full_probe_matches_exact() {
    let exact = engine_with(RetrievalSettings::default()).await;
    let partitioned = engine_with(RetrievalSettings {
        index: IndexSettings {
            kind: IndexKind::Partitioned,
            metric: Metric::Cosine,
            nprobe: 16,
            partitions: None,
        },
        ..Default::default()
    })
    .await;

    for query in ["React TypeScript frontend", "data pipeline Spark", "security audit"] {
        let a = exact.retrieve_scored(query, Some(5), None).await.unwrap();
        let b = partitioned.retrieve_scored(query, Some(5), None).await.unwrap();
        assert_eq!(a, b, "query: {}", query);
    }
}

#[tokio::test]
async fn test_partitioned_single_probe_still_returns_k() {
    let engine = engine_with(RetrievalSettings {
        index: IndexSettings {
            kind: IndexKind::Partitioned,
            metric: Metric::Cosine,
            nprobe: 1,
            partitions: Some(4),
        },
        ..Default::default()
    })
    .await;

    let hits = engine.retrieve("python", Some(10), None).await.unwrap();
    assert_eq!(hits.len(), 10);
}

#[tokio::test]
async fn test_floor_above_every_score_yields_no_match_reply() {
    let engine = engine_with(RetrievalSettings::default()).await;

    let hits = engine.retrieve("python", None, Some(1.01)).await.unwrap();

    assert!(hits.is_empty());
    assert_eq!(
        responder::format(&hits, "python"),
        "Sorry, I couldn't find any employees matching your requirements."
    );
}

#[tokio::test]
async fn test_cached_engine_returns_same_results() {
    let plain = engine_with(RetrievalSettings::default()).await;

    let roster = Roster::load(bundled_roster_path()).unwrap();
    let cached: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(
        Arc::new(HashEmbedder::new(384)),
        64,
        std::time::Duration::from_secs(60),
    ));
    let engine = RetrievalEngine::build(roster, cached, RetrievalSettings::default())
        .await
        .unwrap();

    for _ in 0..2 {
        let a = plain.retrieve_scored("React TypeScript", None, None).await.unwrap();
        let b = engine.retrieve_scored("React TypeScript", None, None).await.unwrap();
        assert_eq!(a, b);
    }
}

#[tokio::test]
async fn test_malformed_roster_file_fails_startup() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{"employees": [{"id": 1, "name": "Alice"}]}"#)
        .unwrap();

    let err = Roster::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::DataLoad(_)));
}
