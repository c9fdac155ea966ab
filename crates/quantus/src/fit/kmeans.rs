//! K-means clustering fits.
//!
//! Clustering has no target outputs, so the spec carries its own variable
//! list instead of a template Model. The produced Model declares a single
//! `cluster_id` output (nearest-centroid index) and no density.

use std::sync::Arc;

use ndarray::Array2;

use crate::density::Density;
use crate::domain::Domain;
use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use crate::model::Model;
use super::{design_matrix, FitOutcome, Surrogate, SurrogateFn};

/// Hyperparameters for [`fit_kmeans`].
#[derive(Debug, Clone)]
pub struct KmeansSpec {
    /// Input variables to cluster over.
    pub vars: Vec<String>,
    /// Number of clusters.
    pub n_clusters: usize,
    /// Lloyd-iteration budget.
    pub max_iter: usize,
    /// Seed for the k-means++ initialization.
    pub seed: u64,
}

impl KmeansSpec {
    pub fn new(vars: &[&str], n_clusters: usize) -> Self {
        Self {
            vars: vars.iter().map(|s| s.to_string()).collect(),
            n_clusters,
            max_iter: 100,
            seed: 0,
        }
    }
}

/// Trained centroids.
pub struct TrainedKmeans {
    centroids: Vec<Vec<f64>>,
}

impl TrainedKmeans {
    /// Index of the nearest centroid, as `f64` for the frame cell.
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        vec![nearest(&self.centroids, x).0 as f64]
    }

    /// Cluster centers, row per cluster.
    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| (x - y) * (x - y)).sum()
}

fn nearest(centroids: &[Vec<f64>], x: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(centroid, x);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

/// K-means++ seeding: the first center is a uniform draw, later centers
/// are drawn with probability proportional to squared distance from the
/// nearest chosen center.
fn init_centroids(x: &Array2<f64>, k: usize, rng: &mut fastrand::Rng) -> Vec<Vec<f64>> {
    let n = x.nrows();
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
    centroids.push(x.row(rng.usize(0..n)).to_vec());

    while centroids.len() < k {
        let weights: Vec<f64> = (0..n)
            .map(|i| nearest(&centroids, &x.row(i).to_vec()).1)
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // All points coincide with a center; fall back to uniform.
            centroids.push(x.row(rng.usize(0..n)).to_vec());
            continue;
        }
        let mut target = rng.f64() * total;
        let mut chosen = n - 1;
        for (i, &w) in weights.iter().enumerate() {
            target -= w;
            if target <= 0.0 {
                chosen = i;
                break;
            }
        }
        centroids.push(x.row(chosen).to_vec());
    }
    centroids
}

/// Fit k-means cluster centers over the spec's variables.
///
/// The produced Model has `inputs = vars`, one `cluster_id` output, an
/// unconstrained domain, and no declared density. Same seed and frame
/// reproduce the centroids exactly.
pub fn fit_kmeans(frame: &DataFrame, spec: &KmeansSpec) -> Result<FitOutcome> {
    let missing: Vec<String> = spec
        .vars
        .iter()
        .filter(|name| !frame.has_column(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(QuantusError::missing_columns("kmeans training frame", missing));
    }
    if spec.vars.is_empty() {
        return Err(QuantusError::InvalidParameter(
            "kmeans requires at least one variable".to_string(),
        ));
    }
    let n = frame.n_rows();
    if spec.n_clusters == 0 || spec.n_clusters > n {
        return Err(QuantusError::Fit {
            family: "kmeans".to_string(),
            message: format!(
                "n_clusters must lie in [1, {n}] (got {})",
                spec.n_clusters
            ),
        });
    }

    let x = design_matrix(frame, &spec.vars)?;
    let mut rng = fastrand::Rng::with_seed(spec.seed);
    let mut centroids = init_centroids(&x, spec.n_clusters, &mut rng);
    let mut assignment = vec![usize::MAX; n];

    for _ in 0..spec.max_iter {
        // Assign
        let mut changed = false;
        for i in 0..n {
            let cluster = nearest(&centroids, &x.row(i).to_vec()).0;
            if assignment[i] != cluster {
                assignment[i] = cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        // Update
        let d = x.ncols();
        let mut sums = vec![vec![0.0; d]; spec.n_clusters];
        let mut counts = vec![0usize; spec.n_clusters];
        for i in 0..n {
            counts[assignment[i]] += 1;
            for j in 0..d {
                sums[assignment[i]][j] += x[[i, j]];
            }
        }
        for (cluster, (sum, &count)) in sums.iter().zip(&counts).enumerate() {
            if count > 0 {
                centroids[cluster] = sum.iter().map(|v| v / count as f64).collect();
            }
            // Empty clusters keep their previous center.
        }
    }

    let trained = TrainedKmeans { centroids };
    let inputs: Vec<String> = spec.vars.clone();

    let model = Model::from_parts(
        "kmeans".to_string(),
        inputs,
        vec!["cluster_id".to_string()],
        Arc::new(SurrogateFn {
            surrogate: Surrogate::Kmeans(trained),
            with_std: false,
        }),
        Domain::new(),
        Density::new(),
    )?;

    Ok(FitOutcome {
        model,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;

    /// Two visually separated clusters of four points each.
    fn cluster_frame() -> DataFrame {
        frame!(
            "x" => [0.1, 0.2, 0.3, 0.4, 1.1, 1.2, 1.3, 1.4],
            "y" => [0.3, 0.2, 0.1, 0.0, 1.3, 1.2, 1.1, 1.0],
            "c" => [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
        )
    }

    #[test]
    fn test_kmeans_recovers_generating_labels() {
        let df = cluster_frame();
        let spec = KmeansSpec::new(&["x", "y"], 2);
        let fit = fit_kmeans(&df, &spec).unwrap();
        let result = fit.model.evaluate(&df).unwrap();
        let ids = result.column("cluster_id").unwrap();
        let truth = df.column("c").unwrap();

        // Same grouping up to label permutation.
        let flipped = ids[0] == 1.0;
        for (&id, &label) in ids.iter().zip(truth) {
            let mapped = if flipped { 1.0 - id } else { id };
            assert_eq!(mapped, label);
        }
    }

    #[test]
    fn test_kmeans_model_schema() {
        let df = cluster_frame();
        let spec = KmeansSpec::new(&["x", "y"], 2);
        let fit = fit_kmeans(&df, &spec).unwrap();
        assert_eq!(fit.model.inputs(), &["x".to_string(), "y".to_string()]);
        assert_eq!(fit.model.outputs(), &["cluster_id".to_string()]);
        assert!(fit.model.density().is_empty());
    }

    #[test]
    fn test_kmeans_seed_reproducible() {
        let df = cluster_frame();
        let spec = KmeansSpec {
            seed: 42,
            ..KmeansSpec::new(&["x", "y"], 3)
        };
        let probe = frame!("x" => [0.0, 0.25, 0.8, 1.5], "y" => [0.0, 0.15, 0.9, 1.2]);
        let a = fit_kmeans(&df, &spec).unwrap().model.evaluate(&probe).unwrap();
        let b = fit_kmeans(&df, &spec).unwrap().model.evaluate(&probe).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_kmeans_too_many_clusters() {
        let df = frame!("x" => [1.0, 2.0]);
        let spec = KmeansSpec::new(&["x"], 3);
        assert!(fit_kmeans(&df, &spec).is_err());
    }
}
