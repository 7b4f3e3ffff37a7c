//! Streaming K-Means over per-access-point time series.
//!
//! Series are fetched one at a time through a callback, so memory stays
//! bounded by the centroids plus the series being assigned.

use occubench_gen::BenchRng;
use occubench_types::{ApName, KMeansCluster};
use tracing::info;

use crate::error::BenchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeans {
    pub clusters: usize,
    pub iterations: usize,
}

impl KMeans {
    pub fn new(clusters: usize, iterations: usize) -> Self {
        Self {
            clusters,
            iterations,
        }
    }

    /// Clusters `aps` by their series.
    ///
    /// The input order is shuffled once with `rng`; the first `k` series
    /// fetched become the initial centroids. Returns exactly
    /// `min(clusters, aps.len())` clusters, some of which may be empty.
    pub fn run<F>(&self, aps: &[ApName], rng: &mut BenchRng, mut fetch: F) -> BenchResult<Vec<KMeansCluster>>
    where
        F: FnMut(&ApName) -> BenchResult<Vec<u64>>,
    {
        let mut order = aps.to_vec();
        rng.shuffle(&mut order);

        let k = if self.clusters > order.len() {
            info!(
                requested = self.clusters,
                aps = order.len(),
                "fewer access points than clusters, clamping"
            );
            order.len()
        } else {
            self.clusters
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut centroids: Vec<Vec<u64>> = Vec::with_capacity(k);
        let mut assignment = vec![0usize; order.len()];

        for _ in 0..self.iterations.max(1) {
            let mut sums: Vec<Vec<u64>> = vec![Vec::new(); k];
            let mut counts = vec![0u64; k];

            for (i, ap) in order.iter().enumerate() {
                let series = fetch(ap)?;
                let cluster = if centroids.len() < k {
                    centroids.push(series.clone());
                    centroids.len() - 1
                } else {
                    nearest(&centroids, &series)
                };
                assignment[i] = cluster;
                counts[cluster] += 1;

                // Sums are as long as the first centroid.
                let sum = &mut sums[cluster];
                if sum.is_empty() {
                    sum.resize(centroids[0].len(), 0);
                }
                for (acc, value) in sum.iter_mut().zip(&series) {
                    *acc = acc.saturating_add(*value);
                }
            }

            for ((centroid, sum), count) in centroids.iter_mut().zip(&sums).zip(&counts) {
                if *count > 0 && !sum.is_empty() {
                    *centroid = sum.iter().map(|s| s / count).collect();
                }
            }
        }

        let mut clusters = vec![KMeansCluster::default(); k];
        for (ap, cluster) in order.into_iter().zip(assignment) {
            clusters[cluster].aps.insert(ap);
        }
        Ok(clusters)
    }
}

/// Index of the closest centroid. Ties go to the lower index.
fn nearest(centroids: &[Vec<u64>], series: &[u64]) -> usize {
    let mut best = 0;
    let mut best_distance = u64::MAX;
    for (i, centroid) in centroids.iter().enumerate() {
        let d = distance(centroid, series);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// Position-wise absolute difference; the tail of the longer series is
/// added as is.
fn distance(a: &[u64], b: &[u64]) -> u64 {
    let common = a.len().min(b.len());
    let shared: u64 = a[..common]
        .iter()
        .zip(&b[..common])
        .fold(0u64, |acc, (x, y)| acc.saturating_add(x.abs_diff(*y)));
    let tail = if a.len() > common { &a[common..] } else { &b[common..] };
    tail.iter().fold(shared, |acc, v| acc.saturating_add(*v))
}
