//! Songbook - song recommendations for sermons
//!
//! Embeds every song in a lyric corpus once, then ranks songs by cosine
//! similarity against the embedding of a query text (usually a sermon).

pub mod cache;
pub mod config;
pub mod corpus;
pub mod display;
pub mod embedding;
pub mod error;
pub mod preprocess;
pub mod ranking;
pub mod service;

pub use cache::{CacheStats, EmbeddingCache, EmbeddingIndex};
pub use config::{Config, ProviderConfig, ProviderKind};
pub use corpus::{Corpus, CorpusId, CorpusStore, InMemoryCorpusStore, JsonCorpusStore, SongRecord};
pub use embedding::{EmbeddingProvider, LexicalEmbeddingProvider};
pub use error::RecommendError;
pub use service::{CorpusSummary, Recommendation, RecommendationService, DEFAULT_TOP_K};
