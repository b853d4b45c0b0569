//! CLI argument parsing and help text

pub fn wants_help(args: &[String]) -> bool {
    args.iter()
        .skip(1)
        .any(|a| a == "-h" || a == "--help" || a == "help")
}

pub fn wants_version(args: &[String]) -> bool {
    args.iter()
        .skip(1)
        .any(|a| a == "-V" || a == "--version" || a == "version")
}

pub fn print_help() {
    println!("semantic-code-navigator");
    println!();
    println!("MCP server over stdio for hybrid semantic search and clustered navigation of a repository.");
    println!();
    println!("Usage:");
    println!("  semantic-code-navigator");
    println!("  semantic-code-navigator --help");
    println!("  semantic-code-navigator --version");
    println!();
    println!("Required env:");
    println!("  BASE_DIR=/absolute/path/to/repo");
    println!();
    println!("Common env (defaults shown):");
    println!("  CACHE_DIR=./.semnav                   (resolved under BASE_DIR if relative)");
    println!("  EMBEDDINGS_BACKEND=ollama|fastembed|hash  (default: ollama)");
    println!("  EMBEDDINGS_MODEL=nomic-embed-text     (fastembed: BAAI/bge-small-en-v1.5)");
    println!("  EMBEDDINGS_MODEL_DIR=./.semnav/models  (fastembed only)");
    println!("  OLLAMA_URL=http://localhost:11434");
    println!("  EMBEDDING_BATCH_SIZE=8                (clamped to 1..=32)");
    println!("  EMBEDDING_TIMEOUT_SECS=60");
    println!("  EMBEDDING_SHRINK_FACTOR=0.75");
    println!("  EMBEDDING_MAX_SHRINK_RETRIES=4");
    println!("  HASH_EMBEDDING_DIM=256");
    println!("  INDEX_TTL_SECS=30");
    println!("  MAX_DOCUMENT_CHARS, MAX_FILE_BYTES");
    println!("  IGNORED_PREFIXES=.git,node_modules,target,...  (comma-separated)");
    println!();
    println!("Ranking env:");
    println!("  RANK_SEMANTIC_WEIGHT, RANK_KEYWORD_WEIGHT");
    println!("  KEYWORD_COVERAGE_WEIGHT, KEYWORD_SYMBOL_WEIGHT, KEYWORD_PHRASE_BOOST");
    println!("  CALLSITE_SEMANTIC_WEIGHT, CALLSITE_KEYWORD_WEIGHT");
    println!();
    println!("Navigator env:");
    println!("  NAVIGATOR_MAX_DEPTH=3  NAVIGATOR_MAX_CLUSTERS=8  NAVIGATOR_LEAF_SIZE=8");
    println!("  LABELS_ENABLED=true    LABEL_MODEL=llama3.2");
    println!();
    println!("Change tracking and restore points:");
    println!("  WATCH_MODE=true  WATCH_DEBOUNCE_MS=500  WATCH_BATCH_SIZE=32");
    println!("  RESTORE_MAX_POINTS=20");
    println!();
    println!("Notes:");
    println!("  - Set EMBEDDINGS_BACKEND=hash to use deterministic hashing (no model).");
    println!("  - Logs go to stderr; tune with RUST_LOG.");
    println!();
    println!("Tools:");
    println!("  semantic_search, search_identifiers, find_call_sites, navigate, refresh_index,");
    println!("  index_stats, create_restore_point, list_restore_points, restore");
}

pub fn print_version() {
    println!("{}", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wants_help_and_version_detect_common_flags() {
        assert!(wants_help(&["bin".to_string(), "--help".to_string()]));
        assert!(wants_help(&["bin".to_string(), "-h".to_string()]));
        assert!(wants_version(&["bin".to_string(), "--version".to_string()]));
        assert!(wants_version(&["bin".to_string(), "-V".to_string()]));
        assert!(!wants_help(&["bin".to_string()]));
        assert!(!wants_version(&["bin".to_string()]));
    }
}
