//! rstest fixtures for integration tests
//!
//! `repo` lays out a small TypeScript project in a temp dir: three topical
//! modules (JWT auth, arithmetic, Stripe billing) and a batch job that calls
//! `chargeCard` fifty times. Everything downstream uses the hash embedder,
//! so no model server is needed.

use super::helpers::{retriever_with, write_file};
use rstest::*;
use semantic_code_navigator::{
    config::{Config, EmbeddingsBackend},
    embeddings::hash::HashEmbedder,
    handlers::AppState,
    retrieval::Retriever,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const CALL_SITES: usize = 50;

/// A temp repository plus the config pointing at it. Keep it alive for the
/// duration of the test; dropping it removes the directory.
pub struct TestRepo {
    pub dir: TempDir,
    pub config: Arc<Config>,
}

pub fn test_config(dir: &TempDir) -> Config {
    let base_dir = dir
        .path()
        .canonicalize()
        .unwrap_or_else(|_| dir.path().to_path_buf());
    let mut config = Config::with_base_dir(base_dir);
    config.embeddings_backend = EmbeddingsBackend::Hash;
    config.labels_enabled = false;
    config.watch_mode = false;
    config.restore_max_points = 5;
    config
}

#[fixture]
pub fn repo() -> TestRepo {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_file(
        root,
        "src/auth/jwt.ts",
        "// JWT authentication.\n\
         // Issues session tokens after login and verifies them on each request.\n\
         export function issueSessionToken(userId: string): string {\n\
         \x20 return sign({ sub: userId }, secret);\n\
         }\n\
         \n\
         export function verifySessionToken(token: string): boolean {\n\
         \x20 return verify(token, secret);\n\
         }\n",
    );
    write_file(
        root,
        "src/math/arithmetic.ts",
        "// Arithmetic operations.\n\
         export function add(a: number, b: number): number {\n\
         \x20 return a + b;\n\
         }\n\
         \n\
         export function multiply(a: number, b: number): number {\n\
         \x20 return a * b;\n\
         }\n",
    );
    write_file(
        root,
        "src/billing/stripe.ts",
        "// Stripe payment processing.\n\
         export function chargeCard(amount: number): Promise<void> {\n\
         \x20 return stripe.charges.create({ amount });\n\
         }\n",
    );
    let mut batch = String::from("// Nightly billing run.\nexport function runBatch(): void {\n");
    for _ in 0..CALL_SITES {
        batch.push_str("  chargeCard(100);\n");
    }
    batch.push_str("}\n");
    write_file(root, "src/billing/batch.ts", &batch);

    let config = Arc::new(test_config(&dir));
    TestRepo { dir, config }
}

#[fixture]
pub fn retriever(repo: TestRepo) -> (TestRepo, Retriever) {
    let embedder = Arc::new(HashEmbedder::new(repo.config.hash_embedding_dim));
    let retriever = retriever_with(repo.config.clone(), embedder);
    (repo, retriever)
}

#[fixture]
pub fn app_state(retriever: (TestRepo, Retriever)) -> (TestRepo, AppState) {
    let (repo, retriever) = retriever;
    let state = AppState::new(repo.config.clone(), Arc::new(retriever), None);
    (repo, state)
}
