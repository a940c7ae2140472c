//! Isolation Forest implementation
//!
//! Anomalies are easier to isolate and thus have shorter path lengths in
//! randomly grown trees. Scores follow the "higher = more normal" convention:
//! `score(x) = -2^(-E[h(x)] / c(psi))`, so they lie in `[-1, 0)`.
//!
//! The decision boundary (`offset`) is the `contamination` percentile of the
//! training scores. Changing `contamination` moves the boundary but never the
//! scores themselves.

use super::{Label, OutlierModel};
use crate::config::ModelConfig;
use crate::error::{EngineError, Result};
use crate::feature_extractor::{FeatureVector, FEATURE_DIMENSION};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Anomaly score assigned to every query when the forest cannot normalise
/// path lengths (a single-sample corpus).
const NEUTRAL_ANOMALY_SCORE: f64 = 0.5;

/// Feature differences below this fraction of the corpus magnitude are
/// rounding noise: they are never split on and never leave a leaf's envelope.
const RELATIVE_TOLERANCE: f64 = 1e-6;

type Row = [f64; FEATURE_DIMENSION];

/// Isolation Forest model for trajectory segments
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    random_state: Option<u64>,
    fitted: Option<FittedForest>,
}

/// Everything produced by a successful fit
#[derive(Debug, Clone)]
struct FittedForest {
    trees: Vec<IsolationTree>,
    /// c(psi) for the per-tree sample size
    normaliser: f64,
    /// Scores strictly below this are outliers
    offset: f64,
}

impl IsolationForest {
    /// Create an unfitted forest, validating the configuration
    pub fn new(config: &ModelConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            n_estimators: config.n_estimators,
            max_samples: config.max_samples,
            contamination: config.contamination,
            random_state: config.random_state,
            fitted: None,
        })
    }

    /// Create with custom parameters
    pub fn with_params(
        n_estimators: usize,
        max_samples: usize,
        contamination: f64,
        random_state: Option<u64>,
    ) -> Result<Self> {
        Self::new(&ModelConfig {
            n_estimators,
            max_samples,
            contamination,
            random_state,
        })
    }

    /// Decision boundary of the fitted forest
    pub fn offset(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.offset)
    }

    /// Calculate average path length of an unsuccessful BST search (c(n) function)
    fn average_path_length(n: usize) -> f64 {
        match n {
            0 | 1 => 0.0,
            2 => 1.0,
            _ => {
                let n = n as f64;
                2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
            }
        }
    }

    fn fitted(&self) -> Result<&FittedForest> {
        self.fitted.as_ref().ok_or(EngineError::ModelNotFitted)
    }
}

impl FittedForest {
    fn score_row(&self, row: &Row) -> f64 {
        if self.normaliser <= 0.0 || self.trees.is_empty() {
            return -NEUTRAL_ANOMALY_SCORE;
        }

        let total_path_length: f64 = self.trees.iter().map(|tree| tree.path_length(row)).sum();
        let avg_path = total_path_length / self.trees.len() as f64;

        -(2.0_f64.powf(-avg_path / self.normaliser))
    }
}

impl OutlierModel for IsolationForest {
    fn fit(&mut self, corpus: &[FeatureVector]) -> Result<()> {
        if corpus.is_empty() {
            return Err(EngineError::DegenerateFeatureBatch);
        }

        let rows: Vec<Row> = corpus.iter().map(FeatureVector::as_array).collect();
        if let Some(index) = rows.iter().position(|r| r.iter().any(|v| !v.is_finite())) {
            return Err(EngineError::ModelFitFailure(format!(
                "non-finite feature value in training row {}",
                index
            )));
        }

        let mut rng = match self.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let sample_size = self.max_samples.min(rows.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let tolerance = tolerance(&rows);

        let trees: Vec<IsolationTree> = (0..self.n_estimators)
            .map(|_| {
                // Sample without replacement
                let sample: Vec<Row> = rand::seq::index::sample(&mut rng, rows.len(), sample_size)
                    .into_iter()
                    .map(|idx| rows[idx])
                    .collect();
                IsolationTree::build(&sample, max_depth, tolerance, &mut rng)
            })
            .collect();

        let mut forest = FittedForest {
            trees,
            normaliser: Self::average_path_length(sample_size),
            offset: 0.0,
        };

        let mut training_scores: Vec<f64> = rows.iter().map(|r| forest.score_row(r)).collect();
        training_scores.sort_by(f64::total_cmp);
        forest.offset = percentile(&training_scores, self.contamination);

        debug!(
            corpus_size = rows.len(),
            sample_size = sample_size,
            trees = forest.trees.len(),
            offset = forest.offset,
            "Isolation forest fitted"
        );

        self.fitted = Some(forest);
        Ok(())
    }

    fn score(&self, batch: &[FeatureVector]) -> Result<Vec<f64>> {
        let forest = self.fitted()?;
        Ok(batch.iter().map(|v| forest.score_row(&v.as_array())).collect())
    }

    fn predict_label(&self, batch: &[FeatureVector]) -> Result<Vec<Label>> {
        let forest = self.fitted()?;
        Ok(batch
            .iter()
            .map(|v| {
                if forest.score_row(&v.as_array()) < forest.offset {
                    Label::Outlier
                } else {
                    Label::Normal
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "IsolationForest"
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

/// Linear-interpolated quantile of an ascending slice, `q` in [0, 1]
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// Per-feature noise floor, relative to the largest magnitude in the corpus
fn tolerance(rows: &[Row]) -> Row {
    let mut tolerance = [0.0_f64; FEATURE_DIMENSION];
    for row in rows {
        for f in 0..FEATURE_DIMENSION {
            tolerance[f] = tolerance[f].max(row[f].abs() * RELATIVE_TOLERANCE);
        }
    }
    tolerance
}

/// A single isolation tree
#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
    tolerance: Row,
}

/// Node in an isolation tree
#[derive(Debug, Clone)]
enum IsolationNode {
    Internal {
        feature_idx: usize,
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    /// Leaf keeps the bounding box of the samples that reached it
    Leaf { size: usize, lower: Row, upper: Row },
}

impl IsolationTree {
    fn build<R: Rng>(samples: &[Row], max_depth: usize, tolerance: Row, rng: &mut R) -> Self {
        Self {
            root: Self::build_node(samples, 0, max_depth, &tolerance, rng),
            tolerance,
        }
    }

    fn build_node<R: Rng>(
        samples: &[Row],
        depth: usize,
        max_depth: usize,
        tolerance: &Row,
        rng: &mut R,
    ) -> IsolationNode {
        let (lower, upper) = bounds(samples);
        let leaf = IsolationNode::Leaf {
            size: samples.len(),
            lower,
            upper,
        };

        // Terminal conditions
        if depth >= max_depth || samples.len() <= 1 {
            return leaf;
        }

        // Only features with spread above the noise floor can separate samples
        let splittable: Vec<usize> = (0..FEATURE_DIMENSION)
            .filter(|&f| upper[f] - lower[f] > tolerance[f])
            .collect();
        if splittable.is_empty() {
            return leaf;
        }

        let feature_idx = splittable[rng.gen_range(0..splittable.len())];
        let split_value = rng.gen_range(lower[feature_idx]..upper[feature_idx]);

        let (left_samples, right_samples): (Vec<Row>, Vec<Row>) =
            samples.iter().copied().partition(|s| s[feature_idx] < split_value);

        if left_samples.is_empty() || right_samples.is_empty() {
            return leaf;
        }

        IsolationNode::Internal {
            feature_idx,
            split_value,
            left: Box::new(Self::build_node(
                &left_samples,
                depth + 1,
                max_depth,
                tolerance,
                rng,
            )),
            right: Box::new(Self::build_node(
                &right_samples,
                depth + 1,
                max_depth,
                tolerance,
                rng,
            )),
        }
    }

    /// Path length of a query through this tree.
    ///
    /// Leaves add the expected depth of the unbuilt subtree only when the query
    /// lies within the samples' bounding box. Outside it, the query counts as
    /// isolated one level above the leaf, so it always scores below any
    /// in-box query reaching the same leaf (a size-1 leaf adds nothing).
    fn path_length(&self, row: &Row) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;

        loop {
            match node {
                IsolationNode::Internal {
                    feature_idx,
                    split_value,
                    left,
                    right,
                } => {
                    node = if row[*feature_idx] < *split_value { left } else { right };
                    depth += 1;
                }
                IsolationNode::Leaf { size, lower, upper } => {
                    let inside = (0..FEATURE_DIMENSION).all(|f| {
                        row[f] >= lower[f] - self.tolerance[f]
                            && row[f] <= upper[f] + self.tolerance[f]
                    });
                    return if inside {
                        depth as f64 + IsolationForest::average_path_length(*size)
                    } else {
                        depth.saturating_sub(1) as f64
                    };
                }
            }
        }
    }
}

fn bounds(samples: &[Row]) -> (Row, Row) {
    let mut lower = [f64::INFINITY; FEATURE_DIMENSION];
    let mut upper = [f64::NEG_INFINITY; FEATURE_DIMENSION];
    for sample in samples {
        for f in 0..FEATURE_DIMENSION {
            lower[f] = lower[f].min(sample[f]);
            upper[f] = upper[f].max(sample[f]);
        }
    }
    (lower, upper)
}
