//! Query-time retrieval over an immutable roster snapshot.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use super::embedding::Embedder;
use super::index::{build_index, IndexSettings, VectorIndex};
use crate::error::{Error, Result};
use crate::roster::{Employee, Roster};

/// Default number of candidates returned per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Retrieval settings fixed at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Candidates returned when the caller does not pass `k`
    pub default_k: usize,
    /// Similarity floor applied when the caller does not pass one.
    /// Unset means plain top-k.
    pub min_score: Option<f32>,
    /// Upper bound on caller-supplied `k`
    pub max_k: usize,
    /// Time budget for embedding a query
    pub embed_timeout_ms: u64,
    /// Index backend and metric
    pub index: IndexSettings,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_TOP_K,
            min_score: None,
            max_k: 50,
            embed_timeout_ms: 5_000,
            index: IndexSettings::default(),
        }
    }
}

/// An employee paired with its normalized (higher is better) score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEmployee {
    pub employee: Employee,
    pub score: f32,
}

/// Roster, embeddings and index built once and shared read-only.
///
/// The index is built from `roster.profile_texts()` in roster order, so index
/// positions are roster positions.
pub struct RetrievalEngine {
    roster: Roster,
    embedder: Arc<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    settings: RetrievalSettings,
}

impl RetrievalEngine {
    /// Embed every profile and build the configured index.
    pub async fn build(
        roster: Roster,
        embedder: Arc<dyn Embedder>,
        settings: RetrievalSettings,
    ) -> Result<Self> {
        if settings.default_k == 0 {
            return Err(Error::Config("default_k must be at least 1".into()));
        }
        if settings.max_k < settings.default_k {
            return Err(Error::Config(format!(
                "max_k ({}) must not be smaller than default_k ({})",
                settings.max_k, settings.default_k
            )));
        }

        let started = Instant::now();
        let texts = roster.profile_texts();
        let vectors = embedder.embed_many(&texts).await?;
        if vectors.len() != roster.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} vectors for {} employees",
                vectors.len(),
                roster.len()
            )));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != embedder.dimension()) {
            return Err(Error::Embedding(format!(
                "embedder '{}' declared dimension {} but produced {}",
                embedder.name(),
                embedder.dimension(),
                v.len()
            )));
        }

        let index = build_index(&settings.index, vectors)?;

        info!(
            employees = roster.len(),
            embedder = embedder.name(),
            index = index.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrieval engine ready"
        );

        Ok(Self {
            roster,
            embedder,
            index,
            settings,
        })
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn index_name(&self) -> &'static str {
        self.index.name()
    }

    /// Ranked employees for `query`, best first.
    pub async fn retrieve(
        &self,
        query: &str,
        k: Option<usize>,
        min_score: Option<f32>,
    ) -> Result<Vec<Employee>> {
        let scored = self.retrieve_scored(query, k, min_score).await?;
        Ok(scored.into_iter().map(|s| s.employee).collect())
    }

    /// Ranked employees with normalized scores, best first.
    ///
    /// `k` and `min_score` fall back to the configured defaults. An empty
    /// result means no candidate cleared the threshold.
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn retrieve_scored(
        &self,
        query: &str,
        k: Option<usize>,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredEmployee>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("query must not be empty".into()));
        }
        if !self.embedder.accepts(query) {
            return Err(Error::Validation("query contains no searchable terms".into()));
        }

        let k = k.unwrap_or(self.settings.default_k);
        if k == 0 {
            return Err(Error::Validation("k must be a positive integer".into()));
        }
        if k > self.settings.max_k {
            return Err(Error::Validation(format!(
                "k must not exceed {}",
                self.settings.max_k
            )));
        }

        let min_score = min_score.or(self.settings.min_score);
        if let Some(floor) = min_score {
            if !floor.is_finite() {
                return Err(Error::Validation("min_score must be a finite number".into()));
            }
        }

        let started = Instant::now();
        let query_vector = self.embed_query(query).await?;
        let neighbors = self.index.search(&query_vector, k)?;

        let metric = self.index.metric();
        let matches: Vec<ScoredEmployee> = neighbors
            .into_iter()
            .map(|n| (n.position, metric.normalize(n.raw)))
            .filter(|(_, score)| min_score.map_or(true, |floor| *score >= floor))
            .map(|(position, score)| {
                self.roster
                    .get(position)
                    .cloned()
                    .map(|employee| ScoredEmployee { employee, score })
                    .ok_or_else(|| {
                        Error::Index(format!("index returned unknown position {}", position))
                    })
            })
            .collect::<Result<_>>()?;

        metrics::histogram!("staffing_retrieval_seconds").record(started.elapsed().as_secs_f64());
        if matches.is_empty() {
            metrics::counter!("staffing_retrieval_empty_total").increment(1);
        }
        debug!(
            k,
            min_score = ?min_score,
            returned = matches.len(),
            "Retrieval complete"
        );

        Ok(matches)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let budget = Duration::from_millis(self.settings.embed_timeout_ms);
        match tokio::time::timeout(budget, self.embedder.embed(query)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: "embed_query".into(),
                duration_ms: self.settings.embed_timeout_ms,
            }),
        }
    }
}
