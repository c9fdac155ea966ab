//! Random-forest surrogate regression.
//!
//! Multi-output regression trees grown on seeded bootstrap resamples.
//! Splits maximize summed variance reduction across outputs; candidate
//! thresholds are midpoints between consecutive distinct feature values.
//! Tie-breaks are positional (first feature, first threshold), so training
//! is fully deterministic given the seed.

use std::sync::Arc;

use ndarray::Array2;

use crate::error::{QuantusError, Result};
use crate::frame::DataFrame;
use crate::model::Model;
use super::{check_training_frame, design_matrix, with_std_names, FitOutcome, Surrogate, SurrogateFn};

/// Hyperparameters for [`fit_forest`].
#[derive(Debug, Clone)]
pub struct ForestSpec {
    /// Number of trees.
    pub n_trees: usize,
    /// Maximum tree depth (`None` = unbounded).
    pub max_depth: Option<usize>,
    /// Minimum samples per leaf.
    pub min_leaf: usize,
    /// Seed for bootstrap resampling; per-tree RNGs are derived from it
    /// by fixed offsets.
    pub seed: u64,
    /// Extend outputs with `<name>_std` columns (spread of per-tree
    /// predictions).
    pub uncertainty: bool,
}

impl Default for ForestSpec {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_leaf: 1,
            seed: 0,
            uncertainty: false,
        }
    }
}

enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict<'a>(&'a self, x: &[f64]) -> &'a [f64] {
        match self {
            Node::Leaf { value } => value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[*feature] <= *threshold {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }
}

/// A trained forest.
pub struct TrainedForest {
    trees: Vec<Node>,
    n_outputs: usize,
}

impl TrainedForest {
    /// Mean prediction across trees, per output.
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_outputs];
        for tree in &self.trees {
            for (sum, &value) in sums.iter_mut().zip(tree.predict(x)) {
                *sum += value;
            }
        }
        let n = self.trees.len() as f64;
        sums.iter_mut().for_each(|s| *s /= n);
        sums
    }

    /// Population standard deviation of per-tree predictions, per output.
    pub fn predict_std(&self, x: &[f64]) -> Vec<f64> {
        let means = self.predict(x);
        let mut sq = vec![0.0; self.n_outputs];
        for tree in &self.trees {
            for (acc, (&value, mean)) in sq.iter_mut().zip(tree.predict(x).iter().zip(&means)) {
                let d = value - mean;
                *acc += d * d;
            }
        }
        let n = self.trees.len() as f64;
        sq.into_iter().map(|s| (s / n).sqrt()).collect()
    }
}

/// Per-output mean of the given sample rows.
fn leaf_value(y: &Array2<f64>, indices: &[usize]) -> Vec<f64> {
    let m = y.ncols();
    let mut means = vec![0.0; m];
    for &i in indices {
        for k in 0..m {
            means[k] += y[[i, k]];
        }
    }
    let n = indices.len() as f64;
    means.iter_mut().for_each(|v| *v /= n);
    means
}

/// Summed (over outputs) sum of squared deviations of the rows.
fn node_impurity(y: &Array2<f64>, indices: &[usize]) -> f64 {
    let means = leaf_value(y, indices);
    let mut total = 0.0;
    for &i in indices {
        for (k, mean) in means.iter().enumerate() {
            let d = y[[i, k]] - mean;
            total += d * d;
        }
    }
    total
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

fn best_split(
    x: &Array2<f64>,
    y: &Array2<f64>,
    indices: &[usize],
    min_leaf: usize,
) -> Option<SplitChoice> {
    let parent_impurity = node_impurity(y, indices);
    if parent_impurity <= 1e-12 {
        return None;
    }

    let mut best: Option<(f64, SplitChoice)> = None;
    for feature in 0..x.ncols() {
        let mut values: Vec<f64> = indices.iter().map(|&i| x[[i, feature]]).collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();

        for pair in values.windows(2) {
            let threshold = 0.5 * (pair[0] + pair[1]);
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .copied()
                .partition(|&i| x[[i, feature]] <= threshold);
            if left.len() < min_leaf || right.len() < min_leaf {
                continue;
            }
            let child_impurity = node_impurity(y, &left) + node_impurity(y, &right);
            let gain = parent_impurity - child_impurity;
            // Strict improvement keeps tie-breaks positional.
            let is_better = match &best {
                Some((best_gain, _)) => gain > *best_gain + 1e-12,
                None => gain > 1e-12,
            };
            if is_better {
                best = Some((
                    gain,
                    SplitChoice {
                        feature,
                        threshold,
                        left,
                        right,
                    },
                ));
            }
        }
    }
    best.map(|(_, choice)| choice)
}

fn grow_tree(
    x: &Array2<f64>,
    y: &Array2<f64>,
    indices: &[usize],
    depth: usize,
    spec: &ForestSpec,
) -> Node {
    let at_depth_limit = spec.max_depth.is_some_and(|limit| depth >= limit);
    if at_depth_limit || indices.len() < 2 * spec.min_leaf {
        return Node::Leaf {
            value: leaf_value(y, indices),
        };
    }
    match best_split(x, y, indices, spec.min_leaf) {
        Some(split) => Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(grow_tree(x, y, &split.left, depth + 1, spec)),
            right: Box::new(grow_tree(x, y, &split.right, depth + 1, spec)),
        },
        None => Node::Leaf {
            value: leaf_value(y, indices),
        },
    }
}

/// Fit a random-forest surrogate to the template's outputs.
///
/// The produced Model copies the template's inputs, domain, and density;
/// `uncertainty` extends the outputs with `<name>_std` columns. Training is
/// reproducible: the same seed and frame grow identical trees.
pub fn fit_forest(frame: &DataFrame, template: &Model, spec: &ForestSpec) -> Result<FitOutcome> {
    check_training_frame(frame, template, "forest")?;
    if spec.n_trees == 0 || spec.min_leaf == 0 {
        return Err(QuantusError::InvalidParameter(
            "forest spec requires n_trees >= 1 and min_leaf >= 1".to_string(),
        ));
    }

    let x = design_matrix(frame, template.inputs())?;
    let y = design_matrix(frame, template.outputs())?;
    let n = x.nrows();

    let trees: Vec<Node> = (0..spec.n_trees)
        .map(|t| {
            let mut rng = fastrand::Rng::with_seed(spec.seed.wrapping_add(t as u64));
            let indices: Vec<usize> = (0..n).map(|_| rng.usize(0..n)).collect();
            grow_tree(&x, &y, &indices, 0, spec)
        })
        .collect();

    let trained = TrainedForest {
        trees,
        n_outputs: y.ncols(),
    };

    let outputs = if spec.uncertainty {
        with_std_names(template.outputs())
    } else {
        template.outputs().to_vec()
    };

    let model = Model::from_parts(
        format!("{}_forest", template.name()),
        template.inputs().to_vec(),
        outputs,
        Arc::new(SurrogateFn {
            surrogate: Surrogate::Forest(trained),
            with_std: spec.uncertainty,
        }),
        template.domain().clone(),
        template.density().clone(),
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

    /// Step function: y = 0, z = 1 below 5 and 0 above.
    fn step_data() -> (DataFrame, Model) {
        let xs: Vec<f64> = (0..8).map(|i| i as f64 * 10.0 / 7.0).collect();
        let zs: Vec<f64> = xs.iter().map(|&x| if x < 5.0 { 1.0 } else { 0.0 }).collect();
        let mut df = DataFrame::new();
        df.push_column("x", xs.clone()).unwrap();
        df.push_column("y", vec![0.0; 8]).unwrap();
        df.push_column("z", zs).unwrap();
        let template = Model::from_fn("step", &["x"], &["y", "z"], |v: &[f64]| {
            vec![0.0, if v[0] < 5.0 { 1.0 } else { 0.0 }]
        })
        .unwrap();
        (df, template)
    }

    #[test]
    fn test_forest_recovers_stump_ends() {
        let (df, template) = step_data();
        let spec = ForestSpec {
            max_depth: Some(1),
            seed: 101,
            ..ForestSpec::default()
        };
        let fit = fit_forest(&df, &template, &spec).unwrap();
        let result = fit.model.evaluate(&frame!("x" => [0.0, 10.0])).unwrap();
        assert!(result.get("z", 0).unwrap() > 0.9);
        assert!(result.get("z", 1).unwrap() < 0.1);
        assert!(result.get("y", 0).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_forest_seed_reproducible() {
        let (df, template) = step_data();
        let spec = ForestSpec {
            seed: 7,
            ..ForestSpec::default()
        };
        let probe = frame!("x" => [1.3, 4.9, 7.7]);
        let a = fit_forest(&df, &template, &spec)
            .unwrap()
            .model
            .evaluate(&probe)
            .unwrap();
        let b = fit_forest(&df, &template, &spec)
            .unwrap()
            .model
            .evaluate(&probe)
            .unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_forest_uncertainty_outputs() {
        let (df, template) = step_data();
        let spec = ForestSpec {
            uncertainty: true,
            seed: 3,
            ..ForestSpec::default()
        };
        let fit = fit_forest(&df, &template, &spec).unwrap();
        assert_eq!(
            fit.model.outputs(),
            &["y", "z", "y_std", "z_std"].map(String::from)
        );
        let result = fit.model.evaluate(&frame!("x" => [5.0])).unwrap();
        assert!(result.get("z_std", 0).is_some());
    }

    #[test]
    fn test_single_value_column_gives_pure_leaf() {
        let df = frame!("x" => [1.0, 2.0, 3.0], "y" => [4.0, 4.0, 4.0]);
        let template =
            Model::from_fn("const", &["x"], &["y"], |_: &[f64]| vec![4.0]).unwrap();
        let spec = ForestSpec {
            n_trees: 10,
            seed: 1,
            ..ForestSpec::default()
        };
        let fit = fit_forest(&df, &template, &spec).unwrap();
        let result = fit.model.evaluate(&frame!("x" => [2.5])).unwrap();
        assert!((result.get("y", 0).unwrap() - 4.0).abs() < 1e-12);
    }
}
