pub mod cli;
pub mod config;
pub mod embeddings;
pub mod handlers;
pub mod indexer;
pub mod navigator;
pub mod path;
pub mod restore;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod text;
pub mod tools;
pub mod watch;
