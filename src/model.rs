//! K-Means clustering of regions, cluster profiles and the 2-D PCA projection

use crate::config::Feature;
use crate::data::RegionTable;
use crate::error::AnalysisError;
use crate::scaler::FeatureMatrix;
use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use linfa_reduction::Pca;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// K-Means settings. A fixed seed makes the assignment reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub k: usize,
    pub seed: u64,
    /// Restarts from different initial centroids; the lowest-inertia run wins
    pub n_runs: usize,
    pub max_iters: u64,
    pub tolerance: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            k: 4,
            seed: 42,
            n_runs: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

/// Fitted clustering keyed by region name.
///
/// Cluster ids are opaque: id 0 is not "best" or "worst". Rank clusters through
/// [`ClusterProfile`] aggregates instead.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    pub k: usize,
    pub assignments: BTreeMap<String, usize>,
    /// Cluster centroids in standardized space, shape (k, columns)
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
    pub columns: Vec<Feature>,
}

impl ClusterModel {
    pub fn cluster_of(&self, region: &str) -> Option<usize> {
        self.assignments.get(region).copied()
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in self.assignments.values() {
            if label < self.k {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Regions of one cluster, sorted by name.
    pub fn members(&self, cluster: usize) -> Vec<&str> {
        self.assignments
            .iter()
            .filter(|(_, &c)| c == cluster)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Nearest centroid for a point in the same standardized space.
    pub fn predict(&self, point: ArrayView1<f64>) -> Option<usize> {
        if point.len() != self.centroids.ncols() {
            return None;
        }
        self.centroids
            .outer_iter()
            .enumerate()
            .map(|(id, centroid)| (id, euclidean_distance(&point, &centroid)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Mean silhouette coefficient over all rows of the matrix the model was fitted on.
    pub fn silhouette(&self, features: &FeatureMatrix) -> f64 {
        let n_samples = features.nrows();
        if n_samples < 2 {
            return 0.0;
        }

        let labels: Vec<Option<usize>> = features
            .regions
            .iter()
            .map(|r| self.cluster_of(r))
            .collect();

        let mut silhouette_sum = 0.0;
        for i in 0..n_samples {
            let Some(cluster_label) = labels[i] else {
                continue;
            };
            let point = features.values.row(i);

            // a(i): mean distance to points in the same cluster
            let mut same_cluster_distances = Vec::new();
            let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); self.k];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }
                let Some(other_label) = labels[j] else {
                    continue;
                };
                let distance = euclidean_distance(&point, &features.values.row(j));

                if other_label == cluster_label {
                    same_cluster_distances.push(distance);
                } else if other_label < self.k {
                    other_cluster_distances[other_label].push(distance);
                }
            }

            // Singletons score 0
            if same_cluster_distances.is_empty() {
                continue;
            }
            let a_i = mean(&same_cluster_distances);

            // b(i): min mean distance to points in other clusters
            let b_i = other_cluster_distances
                .iter()
                .filter(|distances| !distances.is_empty())
                .map(|distances| mean(distances))
                .fold(f64::INFINITY, f64::min);

            if b_i.is_finite() && a_i.max(b_i) > 0.0 {
                silhouette_sum += (b_i - a_i) / a_i.max(b_i);
            }
        }

        silhouette_sum / n_samples as f64
    }
}

/// Fit K-Means on a standardized feature matrix
///
/// # Arguments
/// * `features` - Standardized features with region identity per row
/// * `params` - Cluster count, seed, restarts and convergence settings
///
/// # Returns
/// * Fitted `ClusterModel` with one cluster id in `[0, k)` per region
pub fn fit_kmeans(
    features: &FeatureMatrix,
    params: &ClusterParams,
) -> Result<ClusterModel, AnalysisError> {
    let rows = features.nrows();
    if params.k == 0 || rows < params.k {
        return Err(AnalysisError::InvalidClusterCount { k: params.k, rows });
    }

    let dataset = DatasetBase::from(features.values.clone());
    let rng = StdRng::seed_from_u64(params.seed);

    let model = KMeans::params_with(params.k, rng, L2Dist)
        .n_runs(params.n_runs)
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)
        .map_err(|e| AnalysisError::Clustering(e.to_string()))?;

    let labels: Array1<usize> = model.predict(&features.values);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(&features.values, &labels, &centroids);

    let assignments: BTreeMap<String, usize> = features
        .regions
        .iter()
        .cloned()
        .zip(labels.iter().copied())
        .collect();

    debug!(k = params.k, seed = params.seed, runs = params.n_runs, "k-means fitted");
    info!(k = params.k, inertia, "regions clustered");

    Ok(ClusterModel {
        k: params.k,
        assignments,
        centroids,
        inertia,
        columns: features.columns.clone(),
    })
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            inertia += point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
        }
    }

    inertia
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Raw-value aggregates of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterProfile {
    pub id: usize,
    pub members: Vec<String>,
    /// Mean of every feature over the members; empty for an empty cluster
    pub means: BTreeMap<Feature, f64>,
}

impl ClusterProfile {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn mean(&self, feature: Feature) -> Option<f64> {
        self.means.get(&feature).copied()
    }
}

/// Aggregate the unscaled table per cluster, one profile per id in `[0, k)`.
pub fn cluster_profiles(table: &RegionTable, model: &ClusterModel) -> Vec<ClusterProfile> {
    (0..model.k)
        .map(|id| {
            let members: Vec<String> = model.members(id).into_iter().map(String::from).collect();
            let records: Vec<_> = members.iter().filter_map(|name| table.get(name)).collect();

            let means = if records.is_empty() {
                BTreeMap::new()
            } else {
                Feature::ALL
                    .iter()
                    .map(|&f| {
                        let values: Vec<f64> = records.iter().map(|r| r.value(f)).collect();
                        (f, mean(&values))
                    })
                    .collect()
            };

            ClusterProfile { id, members, means }
        })
        .collect()
}

/// Clusters ordered by mean outcome, highest prevalence first. Empty clusters go last.
pub fn rank_by_outcome(profiles: &[ClusterProfile]) -> Vec<&ClusterProfile> {
    let mut ranked: Vec<&ClusterProfile> = profiles.iter().collect();
    ranked.sort_by(|a, b| {
        let a = a.mean(Feature::LatestOutcome).unwrap_or(f64::NEG_INFINITY);
        let b = b.mean(Feature::LatestOutcome).unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
    ranked
}

/// Standardized features projected onto their first two principal components.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub coordinates: BTreeMap<String, [f64; 2]>,
    pub explained_variance_ratio: [f64; 2],
}

pub fn project_2d(features: &FeatureMatrix) -> Result<Projection, AnalysisError> {
    if features.nrows() < 2 || features.ncols() < 2 {
        return Err(AnalysisError::Projection(format!(
            "need at least 2 rows and 2 columns, got {}x{}",
            features.nrows(),
            features.ncols()
        )));
    }

    let dataset = DatasetBase::from(features.values.clone());
    let pca = Pca::params(2)
        .fit(&dataset)
        .map_err(|e| AnalysisError::Projection(e.to_string()))?;
    let embedded: Array2<f64> = pca.predict(&features.values);
    let ratio = pca.explained_variance_ratio();

    let coordinates = features
        .regions
        .iter()
        .zip(embedded.outer_iter())
        .map(|(name, row)| {
            let x = row.get(0).copied().unwrap_or(0.0);
            let y = row.get(1).copied().unwrap_or(0.0);
            (name.clone(), [x, y])
        })
        .collect();

    Ok(Projection {
        coordinates,
        explained_variance_ratio: [
            ratio.get(0).copied().unwrap_or(0.0),
            ratio.get(1).copied().unwrap_or(0.0),
        ],
    })
}
