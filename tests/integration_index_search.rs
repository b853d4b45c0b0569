//! Integration tests for indexing, hybrid search and call-site ranking
//! against a real temp repository.

mod support;

use rstest::rstest;
use semantic_code_navigator::embeddings::hash::HashEmbedder;
use semantic_code_navigator::retrieval::{
    CallSiteRequest, HybridOptions, IdentifierRequest, NavigateRequest, Retriever, SearchRequest,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use support::fixtures::*;
use support::helpers::{
    index_builder, retriever_with, retriever_with_parser, write_file, CountingEmbedder,
    CountingParser,
};

fn search(query: &str) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        path: None,
        options: HybridOptions::default(),
    }
}

#[rstest]
#[tokio::test]
async fn unchanged_corpus_is_served_from_cache(repo: TestRepo) {
    let (embedder, texts) = CountingEmbedder::new(repo.config.hash_embedding_dim);
    let builder = index_builder(&repo.config, Arc::new(embedder));

    let first = builder.build_file_index().await.unwrap();
    let first_ids = builder.build_identifier_index().await.unwrap();
    let embedded = texts.load(Ordering::SeqCst);
    assert_eq!(first.stats.embedded, first.stats.documents);
    assert!(embedded >= first.stats.documents + first_ids.stats.identifiers);

    let second = builder.build_file_index().await.unwrap();
    let second_ids = builder.build_identifier_index().await.unwrap();
    assert_eq!(texts.load(Ordering::SeqCst), embedded);
    assert_eq!(second.stats.embedded, 0);
    assert_eq!(second.stats.cache_hits, second.stats.documents);
    assert_eq!(second_ids.stats.cache_hits, second_ids.stats.identifiers);
}

#[rstest]
#[tokio::test]
async fn cold_start_parses_each_file_once(repo: TestRepo) {
    let (parser, analyzed) = CountingParser::new();
    let embedder = Arc::new(HashEmbedder::new(repo.config.hash_embedding_dim));
    let retriever = retriever_with_parser(repo.config.clone(), embedder, Arc::new(parser));

    let files = retriever.file_index().await.unwrap();
    let identifiers = retriever.identifier_index().await.unwrap();
    assert_eq!(files.stats.documents, 4);
    assert!(identifiers.stats.identifiers > 0);
    assert_eq!(analyzed.load(Ordering::SeqCst), 4);

    retriever.invalidate().await;
    retriever.identifier_index().await.unwrap();
    retriever.file_index().await.unwrap();
    assert_eq!(analyzed.load(Ordering::SeqCst), 8);
}

#[rstest]
#[tokio::test]
async fn editing_one_file_re_embeds_only_that_file(repo: TestRepo) {
    let (embedder, texts) = CountingEmbedder::new(repo.config.hash_embedding_dim);
    let builder = index_builder(&repo.config, Arc::new(embedder));
    builder.build_file_index().await.unwrap();
    builder.build_identifier_index().await.unwrap();

    write_file(
        repo.dir.path(),
        "src/math/arithmetic.ts",
        "// Arithmetic operations.\nexport function subtract(a: number, b: number): number {\n  return a - b;\n}\n",
    );
    let before = texts.load(Ordering::SeqCst);
    let outcome = builder
        .refresh_paths(&["src/math/arithmetic.ts".to_string()])
        .await
        .unwrap();
    assert_eq!(outcome.refreshed, 1);
    // The file vector plus its new identifiers; nothing from the other files.
    assert!(outcome.embedded >= 2);
    assert!(outcome.embedded < 5);
    assert_eq!(texts.load(Ordering::SeqCst) - before, outcome.embedded);

    let rebuilt = builder.build_file_index().await.unwrap();
    assert_eq!(rebuilt.stats.embedded, 0);
}

#[rstest]
#[tokio::test]
async fn session_token_query_ranks_jwt_module_first(retriever: (TestRepo, Retriever)) {
    let (_repo, retriever) = retriever;
    let hits = retriever
        .file_hits(&search("login and session tokens"))
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].path, "src/auth/jwt.ts");
    assert!(hits[0].scores.keyword > 0.0);
    assert!(hits
        .iter()
        .skip(1)
        .all(|h| h.scores.combined <= hits[0].scores.combined));
}

#[rstest]
#[tokio::test]
async fn strict_threshold_yields_explicit_no_matches(retriever: (TestRepo, Retriever)) {
    let (_repo, retriever) = retriever;
    let mut req = search("zebra quantum");
    req.options.min_combined_score = 0.9;
    let report = retriever.search(&req).await.unwrap();
    assert!(report.starts_with("No matches for \"zebra quantum\""));
    assert!(report.contains("min combined 90.0%"));
}

#[rstest]
#[tokio::test]
async fn empty_query_is_an_error(retriever: (TestRepo, Retriever)) {
    let (_repo, retriever) = retriever;
    assert!(retriever.search(&search("   ")).await.is_err());
}

#[rstest]
#[tokio::test]
async fn call_sites_are_bounded_but_counted(retriever: (TestRepo, Retriever)) {
    let (_repo, retriever) = retriever;
    let report = retriever
        .call_site_report(&CallSiteRequest {
            name: "chargeCard".to_string(),
            path: None,
            query: None,
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(report.sites.len(), 2);
    assert_eq!(report.total, CALL_SITES);
    assert!(report.sites.iter().all(|s| s.path == "src/billing/batch.ts"));
}

#[rstest]
#[tokio::test]
async fn identifier_search_attaches_top_calls(retriever: (TestRepo, Retriever)) {
    let (_repo, retriever) = retriever;
    let hits = retriever
        .identifier_hits(&IdentifierRequest {
            query: "chargeCard stripe payment".to_string(),
            path: Some("src/billing".to_string()),
            kinds: Vec::new(),
            options: HybridOptions::default(),
            top_calls_per_identifier: 2,
        })
        .await
        .unwrap();
    let charge = hits
        .iter()
        .find(|h| h.identifier.name == "chargeCard")
        .expect("chargeCard should match");
    let calls = charge.calls.as_ref().unwrap();
    assert_eq!(calls.sites.len(), 2);
    assert_eq!(calls.total, CALL_SITES);
    assert!(hits.iter().all(|h| h.identifier.path.starts_with("src/billing/")));
}

#[rstest]
#[tokio::test]
async fn unknown_identifier_is_an_error(retriever: (TestRepo, Retriever)) {
    let (_repo, retriever) = retriever;
    let err = retriever
        .find_call_sites(&CallSiteRequest {
            name: "doesNotExist".to_string(),
            path: None,
            query: None,
            limit: 5,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unknown identifier `doesNotExist`"));
}

#[rstest]
#[tokio::test]
async fn navigation_covers_every_indexed_file(retriever: (TestRepo, Retriever)) {
    let (_repo, retriever) = retriever;
    let tree = retriever
        .navigate_tree(&NavigateRequest {
            leaf_size: Some(1),
            max_clusters: Some(2),
            ..NavigateRequest::default()
        })
        .await
        .unwrap();
    let mut files = tree.all_files();
    files.sort();
    assert_eq!(
        files,
        vec![
            "src/auth/jwt.ts",
            "src/billing/batch.ts",
            "src/billing/stripe.ts",
            "src/math/arithmetic.ts",
        ]
    );
    assert!(tree.max_depth() <= 3);
}

#[rstest]
#[tokio::test]
async fn refresh_picks_up_new_files(repo: TestRepo) {
    let (embedder, _texts) = CountingEmbedder::new(repo.config.hash_embedding_dim);
    let retriever = retriever_with(repo.config.clone(), Arc::new(embedder));
    let before = retriever.file_index().await.unwrap().documents.len();

    write_file(
        repo.dir.path(),
        "src/auth/oauth.ts",
        "// OAuth login flow.\nexport function startOAuth(): void {}\n",
    );
    let report = retriever
        .refresh(&["src/auth/oauth.ts".to_string()])
        .await
        .unwrap();
    assert!(report.starts_with("Refreshed 1 of 1 files"));
    assert_eq!(
        retriever.file_index().await.unwrap().documents.len(),
        before + 1
    );
}

#[rstest]
#[tokio::test]
async fn refresh_rejects_paths_outside_the_root(repo: TestRepo) {
    let (embedder, texts) = CountingEmbedder::new(repo.config.hash_embedding_dim);
    let retriever = retriever_with(repo.config.clone(), Arc::new(embedder));
    for file in ["../outside.ts", "src/../../outside.ts"] {
        let err = retriever.refresh(&[file.to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("outside index root"), "{file}: {err}");
    }
    assert_eq!(texts.load(Ordering::SeqCst), 0);
}
