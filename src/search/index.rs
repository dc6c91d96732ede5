//! Nearest-neighbour indexes over profile embeddings.
//!
//! Positions returned by an index always refer back into the roster order the
//! vectors were built from. Two backends share the [`VectorIndex`] trait:
//!
//! - [`ExactIndex`]: linear scan, no approximation error
//! - [`PartitionedIndex`]: inverted-file partitions over k-means centroids;
//!   exact whenever `nprobe >= partitions`

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

use super::embedding::EmbeddingVector;
use crate::error::{Error, Result};

/// Lloyd iterations used when training partition centroids.
const KMEANS_ITERATIONS: usize = 10;

/// Similarity/distance function used for ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cosine similarity in [-1, 1]; higher is better
    #[default]
    Cosine,
    /// Squared Euclidean distance; lower is better
    SquaredEuclidean,
}

impl Metric {
    /// Raw metric value between two vectors of equal length.
    pub fn raw(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::SquaredEuclidean => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        }
    }

    /// Map a raw value onto a higher-is-better scale.
    ///
    /// Cosine is returned unchanged; distances map to `1 / (1 + d)` in (0, 1].
    pub fn normalize(&self, raw: f32) -> f32 {
        match self {
            Metric::Cosine => raw,
            Metric::SquaredEuclidean => 1.0 / (1.0 + raw.max(0.0)),
        }
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self, Metric::Cosine)
    }

    /// `Less` when raw value `a` ranks ahead of `b`.
    pub fn rank_cmp(&self, a: f32, b: f32) -> Ordering {
        if self.higher_is_better() {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        }
    }
}

/// Cosine similarity in [-1, 1]. Zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Index backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    #[default]
    Exact,
    Partitioned,
}

/// Index construction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Backend to build
    pub kind: IndexKind,
    /// Ranking metric
    pub metric: Metric,
    /// Partitions scanned per query (partitioned backend only)
    pub nprobe: usize,
    /// Partition count; defaults to round(sqrt(n))
    pub partitions: Option<usize>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            kind: IndexKind::Exact,
            metric: Metric::Cosine,
            nprobe: 2,
            partitions: None,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position in the roster the index was built from
    pub position: usize,
    /// Raw metric value (direction depends on the metric)
    pub raw: f32,
}

/// Nearest-neighbour search over a fixed set of vectors.
pub trait VectorIndex: Send + Sync {
    /// Backend name ("exact", "partitioned")
    fn name(&self) -> &'static str;

    fn metric(&self) -> Metric;

    fn dimension(&self) -> usize;

    /// Number of stored vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top `k` neighbours ordered best first; ties keep roster order.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;
}

/// Build the configured index backend.
pub fn build_index(
    settings: &IndexSettings,
    vectors: Vec<EmbeddingVector>,
) -> Result<Box<dyn VectorIndex>> {
    let dimension = validate_vectors(&vectors)?;

    let index: Box<dyn VectorIndex> = match settings.kind {
        IndexKind::Exact => Box::new(ExactIndex::new(settings.metric, dimension, vectors)),
        IndexKind::Partitioned => Box::new(PartitionedIndex::new(
            settings.metric,
            dimension,
            vectors,
            settings.partitions,
            settings.nprobe,
        )?),
    };

    info!(
        backend = index.name(),
        metric = ?index.metric(),
        vectors = index.len(),
        dimension,
        "Vector index built"
    );
    Ok(index)
}

fn validate_vectors(vectors: &[EmbeddingVector]) -> Result<usize> {
    let first = vectors
        .first()
        .ok_or_else(|| Error::Index("cannot build an index from zero vectors".into()))?;
    let dimension = first.len();
    if dimension == 0 {
        return Err(Error::Index("vectors have zero dimension".into()));
    }

    for (position, v) in vectors.iter().enumerate() {
        if v.len() != dimension {
            return Err(Error::Index(format!(
                "vector {} has dimension {}, expected {}",
                position,
                v.len(),
                dimension
            )));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(Error::Index(format!(
                "vector {} contains non-finite values",
                position
            )));
        }
    }
    Ok(dimension)
}

fn check_query(dimension: usize, query: &[f32], k: usize) -> Result<()> {
    if k == 0 {
        return Err(Error::Validation("k must be a positive integer".into()));
    }
    if query.len() != dimension {
        return Err(Error::Embedding(format!(
            "query vector has dimension {}, index expects {}",
            query.len(),
            dimension
        )));
    }
    Ok(())
}

/// Order best first, break ties by roster position, keep `k`.
fn rank(metric: Metric, mut hits: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    hits.sort_by(|a, b| {
        metric
            .rank_cmp(a.raw, b.raw)
            .then(a.position.cmp(&b.position))
    });
    hits.truncate(k);
    hits
}

// ============================================================================
// Exact scan
// ============================================================================

/// Linear scan over every stored vector.
pub struct ExactIndex {
    metric: Metric,
    dimension: usize,
    vectors: Vec<EmbeddingVector>,
}

impl ExactIndex {
    pub fn new(metric: Metric, dimension: usize, vectors: Vec<EmbeddingVector>) -> Self {
        Self {
            metric,
            dimension,
            vectors,
        }
    }
}

impl VectorIndex for ExactIndex {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_query(self.dimension, query, k)?;

        let hits = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                raw: self.metric.raw(query, v),
            })
            .collect();

        Ok(rank(self.metric, hits, k))
    }
}

// ============================================================================
// Partitioned (approximate)
// ============================================================================

/// Inverted-file index: vectors grouped by nearest centroid.
///
/// Centroids are seeded from evenly spaced roster positions, so building the
/// same vectors always yields the same partitions.
pub struct PartitionedIndex {
    metric: Metric,
    dimension: usize,
    vectors: Vec<EmbeddingVector>,
    centroids: Vec<EmbeddingVector>,
    /// Roster positions per partition, ascending
    lists: Vec<Vec<usize>>,
    nprobe: usize,
}

impl PartitionedIndex {
    pub fn new(
        metric: Metric,
        dimension: usize,
        vectors: Vec<EmbeddingVector>,
        partitions: Option<usize>,
        nprobe: usize,
    ) -> Result<Self> {
        let n = vectors.len();
        let nlist = partitions
            .unwrap_or_else(|| ((n as f64).sqrt().round() as usize).max(1))
            .clamp(1, n.max(1));
        if nprobe == 0 {
            return Err(Error::Index("nprobe must be at least 1".into()));
        }

        let (centroids, lists) = train_partitions(metric, &vectors, nlist);
        debug!(
            partitions = nlist,
            nprobe,
            sizes = ?lists.iter().map(Vec::len).collect::<Vec<_>>(),
            "Partitions trained"
        );

        Ok(Self {
            metric,
            dimension,
            vectors,
            centroids,
            lists,
            nprobe,
        })
    }

    pub fn partitions(&self) -> usize {
        self.centroids.len()
    }

    /// Partition ids ordered by closeness to `query`.
    fn probe_order(&self, query: &[f32]) -> Vec<usize> {
        let mut order: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(id, c)| (id, self.metric.raw(query, c)))
            .collect();
        order.sort_by(|a, b| self.metric.rank_cmp(a.1, b.1).then(a.0.cmp(&b.0)));
        order.into_iter().map(|(id, _)| id).collect()
    }
}

impl VectorIndex for PartitionedIndex {
    fn name(&self) -> &'static str {
        "partitioned"
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_query(self.dimension, query, k)?;

        let mut hits = Vec::new();
        for (probed, list_id) in self.probe_order(query).into_iter().enumerate() {
            // Keep probing past nprobe until k candidates exist
            if probed >= self.nprobe && hits.len() >= k {
                break;
            }
            hits.extend(self.lists[list_id].iter().map(|&position| Neighbor {
                position,
                raw: self.metric.raw(query, &self.vectors[position]),
            }));
        }

        Ok(rank(self.metric, hits, k))
    }
}

fn nearest_centroid(metric: Metric, centroids: &[EmbeddingVector], v: &[f32]) -> usize {
    let mut best = 0;
    let mut best_raw = metric.raw(v, &centroids[0]);
    for (id, c) in centroids.iter().enumerate().skip(1) {
        let raw = metric.raw(v, c);
        if metric.rank_cmp(raw, best_raw) == Ordering::Less {
            best = id;
            best_raw = raw;
        }
    }
    best
}

fn train_partitions(
    metric: Metric,
    vectors: &[EmbeddingVector],
    nlist: usize,
) -> (Vec<EmbeddingVector>, Vec<Vec<usize>>) {
    let n = vectors.len();
    let dimension = vectors[0].len();
    let mut centroids: Vec<EmbeddingVector> =
        (0..nlist).map(|i| vectors[i * n / nlist].clone()).collect();
    let mut assignment: Vec<usize> = vectors
        .iter()
        .map(|v| nearest_centroid(metric, &centroids, v))
        .collect();

    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![vec![0.0f32; dimension]; nlist];
        let mut counts = vec![0usize; nlist];
        for (v, &part) in vectors.iter().zip(&assignment) {
            counts[part] += 1;
            for (s, x) in sums[part].iter_mut().zip(v) {
                *s += x;
            }
        }
        // Empty partitions keep their previous centroid
        for (part, sum) in sums.into_iter().enumerate() {
            if counts[part] > 0 {
                let count = counts[part] as f32;
                centroids[part] = sum.into_iter().map(|s| s / count).collect();
            }
        }

        let mut changed = false;
        for (v, part) in vectors.iter().zip(assignment.iter_mut()) {
            let best = nearest_centroid(metric, &centroids, v);
            if best != *part {
                *part = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut lists = vec![Vec::new(); nlist];
    for (position, &part) in assignment.iter().enumerate() {
        lists[part].push(position);
    }
    (centroids, lists)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, hot: &[(usize, f32)]) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        for &(i, x) in hot {
            v[i] = x;
        }
        v
    }

    fn sample_vectors() -> Vec<Vec<f32>> {
        vec![
            unit(4, &[(0, 1.0)]),
            unit(4, &[(0, 0.8), (1, 0.6)]),
            unit(4, &[(1, 1.0)]),
            unit(4, &[(2, 1.0)]),
            unit(4, &[(2, 0.6), (3, 0.8)]),
            unit(4, &[(3, 1.0)]),
            unit(4, &[(0, 0.6), (3, 0.8)]),
            unit(4, &[(1, 0.6), (2, 0.8)]),
            unit(4, &[(0, 0.5), (1, 0.5), (2, 0.5), (3, 0.5)]),
        ]
    }

    // ================================================================
    // Metric
    // ================================================================

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_similarity_opposite_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_squared_euclidean_normalizes_higher_is_better() {
        let m = Metric::SquaredEuclidean;
        assert_eq!(m.raw(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(m.normalize(0.0), 1.0);
        assert!(m.normalize(1.0) > m.normalize(4.0));
        assert_eq!(m.rank_cmp(1.0, 4.0), Ordering::Less);
    }

    #[test]
    fn test_cosine_ranks_higher_first() {
        assert_eq!(Metric::Cosine.rank_cmp(0.9, 0.1), Ordering::Less);
    }

    // ================================================================
    // Exact index
    // ================================================================

    #[test]
    fn test_exact_returns_best_first() {
        let index = build_index(&IndexSettings::default(), sample_vectors()).unwrap();
        let hits = index.search(&unit(4, &[(0, 1.0)]), 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 1);
        assert!(hits[0].raw >= hits[1].raw && hits[1].raw >= hits[2].raw);
    }

    #[test]
    fn test_exact_k_larger_than_roster() {
        let index = build_index(&IndexSettings::default(), sample_vectors()).unwrap();
        let hits = index.search(&unit(4, &[(1, 1.0)]), 100).unwrap();
        assert_eq!(hits.len(), 9);
    }

    #[test]
    fn test_ties_preserve_roster_order() {
        let vectors = vec![
            unit(2, &[(0, 1.0)]),
            unit(2, &[(1, 1.0)]),
            unit(2, &[(0, 1.0)]),
            unit(2, &[(0, 1.0)]),
        ];
        let index = build_index(&IndexSettings::default(), vectors).unwrap();
        let hits = index.search(&unit(2, &[(0, 1.0)]), 3).unwrap();

        let positions: Vec<_> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 2, 3]);
    }

    #[test]
    fn test_squared_euclidean_returns_closest_first() {
        let settings = IndexSettings {
            metric: Metric::SquaredEuclidean,
            ..Default::default()
        };
        let index = build_index(&settings, sample_vectors()).unwrap();
        let hits = index.search(&unit(4, &[(3, 1.0)]), 2).unwrap();

        assert_eq!(hits[0].position, 5);
        assert_eq!(hits[0].raw, 0.0);
        assert!(hits[1].raw > 0.0);
    }

    #[test]
    fn test_zero_k_is_validation_error() {
        let index = build_index(&IndexSettings::default(), sample_vectors()).unwrap();
        assert!(matches!(
            index.search(&unit(4, &[(0, 1.0)]), 0),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = build_index(&IndexSettings::default(), sample_vectors()).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(Error::Embedding(_))
        ));
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        let err = build_index(&IndexSettings::default(), vectors).err().unwrap();
        assert!(err.to_string().contains("vector 1 has dimension 3"));
    }

    #[test]
    fn test_build_rejects_empty_and_nan() {
        assert!(build_index(&IndexSettings::default(), Vec::new()).is_err());
        assert!(build_index(&IndexSettings::default(), vec![vec![f32::NAN, 1.0]]).is_err());
    }

    // ================================================================
    // Partitioned index
    // ================================================================

    fn partitioned(nprobe: usize, partitions: Option<usize>) -> IndexSettings {
        IndexSettings {
            kind: IndexKind::Partitioned,
            nprobe,
            partitions,
            ..Default::default()
        }
    }

    #[test]
    fn test_partitioned_default_partition_count() {
        let index = PartitionedIndex::new(Metric::Cosine, 4, sample_vectors(), None, 1).unwrap();
        assert_eq!(index.partitions(), 3);
        let stored: usize = index.lists.iter().map(Vec::len).sum();
        assert_eq!(stored, 9);
    }

    #[test]
    fn test_partitioned_full_probe_matches_exact() {
        let exact = build_index(&IndexSettings::default(), sample_vectors()).unwrap();
        let approx = build_index(&partitioned(3, Some(3)), sample_vectors()).unwrap();

        for query in sample_vectors() {
            let a = exact.search(&query, 4).unwrap();
            let b = approx.search(&query, 4).unwrap();
            let pa: Vec<_> = a.iter().map(|h| h.position).collect();
            let pb: Vec<_> = b.iter().map(|h| h.position).collect();
            assert_eq!(pa, pb);
        }
    }

    #[test]
    fn test_partitioned_single_probe_still_fills_k() {
        let approx = build_index(&partitioned(1, Some(3)), sample_vectors()).unwrap();
        let hits = approx.search(&unit(4, &[(0, 1.0)]), 9).unwrap();
        assert_eq!(hits.len(), 9);
    }

    #[test]
    fn test_partitioned_finds_exact_match_in_own_partition() {
        let approx = build_index(&partitioned(1, Some(3)), sample_vectors()).unwrap();
        for (position, v) in sample_vectors().iter().enumerate() {
            let hits = approx.search(v, 1).unwrap();
            assert_eq!(hits[0].position, position);
        }
    }

    #[test]
    fn test_partitioned_rejects_zero_nprobe() {
        assert!(build_index(&partitioned(0, None), sample_vectors()).is_err());
    }

    #[test]
    fn test_partitioned_build_is_deterministic() {
        let a = PartitionedIndex::new(Metric::Cosine, 4, sample_vectors(), Some(3), 1).unwrap();
        let b = PartitionedIndex::new(Metric::Cosine, 4, sample_vectors(), Some(3), 1).unwrap();
        assert_eq!(a.lists, b.lists);
    }
}
