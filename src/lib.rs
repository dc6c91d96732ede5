//! Staffing query service.
//!
//! Ranks a fixed roster of employee profiles against natural-language
//! staffing requests ("Python developers with 3+ years experience") by
//! semantic similarity, and renders the best matches as a chat reply.
//!
//! # Modules
//!
//! - [`roster`] - employee records and roster loading
//! - [`search`] - embedders, vector indexes and the retrieval engine
//! - [`responder`] - chat-style formatting of matches
//! - [`api`] - axum HTTP server
//! - [`config`] - TOML configuration
//! - [`telemetry`] - logging and metrics setup

pub mod api;
pub mod config;
pub mod error;
pub mod responder;
pub mod roster;
pub mod search;
pub mod telemetry;

pub use api::{create_router, ApiConfig, ApiError, ApiServer, AppState};
pub use config::{EmbeddingBackend, EmbeddingConfig, ServiceConfig};
pub use error::{Error, Result};
pub use roster::{Employee, Roster};
pub use search::{
    create_embedder, Embedder, HashEmbedder, IndexKind, IndexSettings, Metric, RetrievalEngine,
    RetrievalSettings, ScoredEmployee,
};
