//! CART classification tree
//!
//! Nodes are stored flat; a split sends a row left when its feature value is
//! `<= threshold`. Leaves hold the class distribution of their training rows.

use crate::schema::{FeatureVector, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

/// One tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features examined per split
    pub max_features: usize,
}

/// A fitted classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree over the rows listed in `sample` (repeats allowed).
    ///
    /// Impurity decreases, weighted by node size, are added to `importances`.
    pub fn fit(
        features: &[FeatureVector],
        classes: &[usize],
        sample: Vec<usize>,
        n_classes: usize,
        params: TreeParams,
        rng: &mut StdRng,
        importances: &mut [f64; FEATURE_COUNT],
    ) -> Self {
        let mut grower = Grower {
            features,
            classes,
            n_classes,
            params,
            rng,
            importances,
            nodes: Vec::new(),
        };
        grower.grow(sample, 0);
        DecisionTree {
            nodes: grower.nodes,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Class distribution of the leaf a row falls into
    pub fn predict_distribution(&self, row: &FeatureVector) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Check node references so traversal can never leave the node list
    pub fn validate(&self, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (id, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { distribution } => {
                    if distribution.len() != n_classes {
                        return Err(format!(
                            "leaf {} has {} classes, expected {}",
                            id,
                            distribution.len(),
                            n_classes
                        ));
                    }
                }
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    // children are always appended after their parent
                    if *feature >= FEATURE_COUNT
                        || *left <= id
                        || *right <= id
                        || *left >= self.nodes.len()
                        || *right >= self.nodes.len()
                    {
                        return Err(format!("split node {} has invalid references", id));
                    }
                }
            }
        }
        Ok(())
    }
}

struct Grower<'a> {
    features: &'a [FeatureVector],
    classes: &'a [usize],
    n_classes: usize,
    params: TreeParams,
    rng: &'a mut StdRng,
    importances: &'a mut [f64; FEATURE_COUNT],
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

impl Grower<'_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        let counts = self.class_counts(&rows);
        let n = rows.len();
        let impurity = gini(&counts, n);

        self.nodes.push(Node::Leaf {
            distribution: distribution(&counts, n),
        });

        if depth >= self.params.max_depth
            || n < self.params.min_samples_split
            || impurity <= f64::EPSILON
        {
            return id;
        }

        let Some(best) = self.best_split(&rows, impurity) else {
            return id;
        };

        self.importances[best.feature] += best.decrease * n as f64;

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.features[i][best.feature] <= best.threshold);

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in rows {
            counts[self.classes[i]] += 1;
        }
        counts
    }

    fn is_constant(&self, rows: &[usize], feature: usize) -> bool {
        let first = self.features[rows[0]][feature];
        rows.iter().all(|&i| self.features[i][feature] == first)
    }

    fn best_split(&mut self, rows: &[usize], parent_impurity: f64) -> Option<BestSplit> {
        let n = rows.len();
        let max_features = self.params.max_features.clamp(1, FEATURE_COUNT);
        // constant features do not count towards max_features
        let order = index::sample(&mut *self.rng, FEATURE_COUNT, FEATURE_COUNT);
        let mut examined = 0;

        let mut best: Option<BestSplit> = None;
        let mut sorted = rows.to_vec();

        for feature in order.iter() {
            if examined == max_features {
                break;
            }
            if self.is_constant(rows, feature) {
                continue;
            }
            examined += 1;

            sorted.sort_by(|&a, &b| {
                self.features[a][feature]
                    .total_cmp(&self.features[b][feature])
                    .then(a.cmp(&b))
            });

            let mut left = vec![0usize; self.n_classes];
            let mut right = self.class_counts(&sorted);

            for pos in 0..n - 1 {
                let class = self.classes[sorted[pos]];
                left[class] += 1;
                right[class] -= 1;

                let here = self.features[sorted[pos]][feature];
                let next = self.features[sorted[pos + 1]][feature];
                if here >= next {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = n - n_left;
                let child_impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;
                let decrease = parent_impurity - child_impurity;

                if best.as_ref().map_or(true, |b| decrease > b.decrease) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        decrease,
                    });
                }
            }
        }

        best
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

fn distribution(counts: &[usize], n: usize) -> Vec<f64> {
    if n == 0 {
        let uniform = 1.0 / counts.len() as f64;
        return vec![uniform; counts.len()];
    }
    counts.iter().map(|&c| c as f64 / n as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn row(a: f64, b: f64) -> FeatureVector {
        let mut r = [0.0; FEATURE_COUNT];
        r[0] = a;
        r[1] = b;
        r
    }

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split: 2,
            max_features: FEATURE_COUNT,
        }
    }

    #[test]
    fn test_gini_values() {
        assert_eq!(gini(&[5, 0], 5), 0.0);
        assert!((gini(&[5, 5], 10) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_separable_data_is_learned_exactly() {
        let x: Vec<FeatureVector> = (0..20).map(|i| row(i as f64, 0.0)).collect();
        let y: Vec<usize> = (0..20).map(|i| usize::from(i >= 10)).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let mut imp = [0.0; FEATURE_COUNT];
        let tree = DecisionTree::fit(&x, &y, (0..20).collect(), 2, params(5), &mut rng, &mut imp);

        for (r, c) in x.iter().zip(y.iter()) {
            let dist = tree.predict_distribution(r);
            assert_eq!(dist[*c], 1.0);
        }
        assert_eq!(tree.depth(), 1);
        // only feature 0 carries signal
        assert!(imp[0] > 0.0);
        assert!(imp[1..].iter().all(|v| *v == 0.0));
        assert!(tree.validate(2).is_ok());
    }

    #[test]
    fn test_depth_limit_respected() {
        let x: Vec<FeatureVector> = (0..64).map(|i| row(i as f64, (i % 7) as f64)).collect();
        let y: Vec<usize> = (0..64).map(|i| i % 3).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let mut imp = [0.0; FEATURE_COUNT];
        let tree = DecisionTree::fit(&x, &y, (0..64).collect(), 3, params(3), &mut rng, &mut imp);
        assert!(tree.depth() <= 3);

        for r in &x {
            let dist = tree.predict_distribution(r);
            assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pure_node_is_leaf() {
        let x: Vec<FeatureVector> = (0..10).map(|i| row(i as f64, 0.0)).collect();
        let y = vec![2; 10];
        let mut rng = StdRng::seed_from_u64(1);
        let mut imp = [0.0; FEATURE_COUNT];
        let tree = DecisionTree::fit(&x, &y, (0..10).collect(), 3, params(10), &mut rng, &mut imp);
        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.predict_distribution(&x[0]), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_validate_rejects_dangling_child() {
        let tree = DecisionTree {
            nodes: vec![Node::Split {
                feature: 0,
                threshold: 1.0,
                left: 1,
                right: 2,
            }],
        };
        assert!(tree.validate(3).is_err());
    }
}
