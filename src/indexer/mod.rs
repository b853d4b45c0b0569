pub mod builder;
pub mod documents;
pub mod extract;
pub mod parser;
pub mod snapshot;
pub mod symbols;
pub mod walker;

pub use builder::{BuildStats, Corpus, FileIndex, IdentifierIndex, IndexBuilder, RefreshOutcome};
pub use documents::{Document, IdentifierDocument, SymbolEntry};
pub use parser::{StructuralParser, TreeSitterParser};
pub use snapshot::SnapshotCache;
pub use symbols::{FileAnalysis, SymbolKind, SymbolNode};
