pub mod blend;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod matcher;
pub mod search;
pub mod service;
pub mod storage;

pub use blend::blend;
pub use embedding::Embedding;
pub use error::{ErrorKind, ImageRole, MatchError};
pub use extractor::{EmbeddingExtractor, OnnxExtractor};
pub use matcher::{rank, MatchResult};
pub use search::{AlphaEstimate, AlphaSearch, AlphaSource, NoTargetPolicy};
pub use service::{FamilyMatch, MatchSettings, MatchingService};
pub use storage::{ChildRecord, DatabaseLoader, EmbeddingDatabase, FileDatabaseLoader};

// Re-export extractor errors for implementors of `EmbeddingExtractor`
pub use kinmatch_vision::ExtractError;
