//! Isolation Forest implementation
//!
//! Anomaly detection using isolation trees. Anomalies are easier to isolate
//! and thus have shorter path lengths in the trees.
//!
//! Every tree draws from its own `StdRng`, seeded from the forest seed and the
//! tree index, so a forest is reproducible and trees can be built in any order
//! (or concurrently) without changing the result.

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize, Serializer};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{AnomalyModel, ModelConfig};
use crate::ml::error::{MlError, Result};
use crate::ml::features::{FeatureVector, NUM_FEATURES};

/// Average path length of an unsuccessful BST search over `n` points (c(n)).
///
/// `c(n) = 2 * H(n - 1) - 2 * (n - 1) / n`, with `c(0) = c(1) = 0`.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let harmonic: f64 = (1..n).map(|i| 1.0 / i as f64).sum();
    let n = n as f64;
    2.0 * harmonic - 2.0 * (n - 1.0) / n
}

/// Height limit for a tree grown on `n` points: ceil(log2(max(n, 2)))
pub fn height_limit(n: usize) -> usize {
    (n.max(2) as f64).log2().ceil() as usize
}

/// Isolation Forest model for anomaly detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    /// Individual isolation trees
    trees: Vec<IsolationTree>,
    /// Points drawn per tree at training time
    sample_size: usize,
    /// c(sample_size), the score normalization factor
    avg_path_length: f64,
}

impl IsolationForest {
    /// Train a forest on `data`.
    ///
    /// Each tree sees `min(config.sample_size, data.len())` points drawn
    /// without replacement.
    pub fn train(data: &[FeatureVector], config: &ModelConfig) -> Result<Self> {
        Self::fit(data, config, cfg!(feature = "parallel"))
    }

    fn fit(data: &[FeatureVector], config: &ModelConfig, parallel: bool) -> Result<Self> {
        config.validate()?;
        if data.is_empty() {
            return Err(MlError::InsufficientData);
        }

        let sample_size = config.sample_size.min(data.len());
        let seed = config.seed;
        let build = |tree_idx: usize| {
            let mut rng = StdRng::seed_from_u64(tree_seed(seed, tree_idx as u64));
            let sample: Vec<FeatureVector> = index::sample(&mut rng, data.len(), sample_size)
                .into_iter()
                .map(|i| data[i])
                .collect();
            IsolationTree::build(&sample, &mut rng)
        };

        #[cfg(feature = "parallel")]
        let trees: Vec<IsolationTree> = if parallel {
            (0..config.num_trees).into_par_iter().map(build).collect()
        } else {
            (0..config.num_trees).map(build).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let trees: Vec<IsolationTree> = {
            let _ = parallel;
            (0..config.num_trees).map(build).collect()
        };

        Ok(Self {
            trees,
            sample_size,
            avg_path_length: average_path_length(sample_size),
        })
    }

    /// Anomaly score in [0, 1]: 2^(-E[h(x)] / c(sample_size)).
    ///
    /// A forest grown on a single point has no usable normalization and
    /// scores every sample 0.5.
    pub fn score(&self, sample: &FeatureVector) -> f64 {
        if self.trees.is_empty() || self.avg_path_length <= 0.0 {
            return 0.5;
        }

        let avg_path = self.mean_path_length(sample);
        2.0_f64.powf(-avg_path / self.avg_path_length)
    }

    /// Score many samples, in input order
    pub fn score_batch(&self, samples: &[FeatureVector]) -> Vec<f64> {
        #[cfg(feature = "parallel")]
        {
            samples.par_iter().map(|s| self.score(s)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            samples.iter().map(|s| self.score(s)).collect()
        }
    }

    /// E[h(x)] over all trees
    pub fn mean_path_length(&self, sample: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|tree| tree.path_length(sample)).sum();
        total / self.trees.len() as f64
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    /// Check structural consistency of a forest that came from outside
    /// (e.g. a decoded artifact).
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if self.sample_size == 0 {
            return Err("sample size is zero".to_string());
        }
        let expected = average_path_length(self.sample_size);
        if self.avg_path_length.to_bits() != expected.to_bits() {
            return Err(format!(
                "normalization {} does not match sample size {}",
                self.avg_path_length, self.sample_size
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}

impl AnomalyModel for IsolationForest {
    fn score(&self, sample: &FeatureVector) -> f64 {
        IsolationForest::score(self, sample)
    }

    fn name(&self) -> &str {
        "IsolationForest"
    }
}

/// SplitMix64 over (seed, tree index), giving each tree its own stream
fn tree_seed(seed: u64, tree_idx: u64) -> u64 {
    let mut z = seed.wrapping_add(tree_idx.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Largest height limit a decoded tree may declare (a 2^64-point subsample)
const MAX_HEIGHT_LIMIT: usize = 64;

/// A single isolation tree
///
/// Serialized as a flat pre-order node list, so decoding an untrusted
/// artifact never recurses and rejects trees deeper than their height limit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "FlatTree")]
pub struct IsolationTree {
    root: IsolationNode,
    height_limit: usize,
}

impl IsolationTree {
    /// Build an isolation tree from a subsample
    pub fn build<R: Rng>(samples: &[FeatureVector], rng: &mut R) -> Self {
        let height_limit = height_limit(samples.len());
        let root = Self::build_node(samples, 0, height_limit, rng);
        Self { root, height_limit }
    }

    /// Recursively build tree nodes
    fn build_node<R: Rng>(
        samples: &[FeatureVector],
        depth: usize,
        height_limit: usize,
        rng: &mut R,
    ) -> IsolationNode {
        // Terminal conditions
        if depth >= height_limit || samples.len() <= 1 {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        }

        // Random axis first, then the others in random order until one varies
        let mut axes: [usize; NUM_FEATURES] = std::array::from_fn(|i| i);
        axes.shuffle(rng);
        let split = axes.iter().find_map(|&axis| {
            let (min, max) = axis_range(samples, axis);
            (min < max).then_some((axis, min, max))
        });

        let Some((feature_idx, min, max)) = split else {
            return IsolationNode::Leaf {
                size: samples.len(),
            };
        };

        // Interpolate rather than scale by `max - min`, which can overflow for
        // finite bounds of opposite sign. Keep both sides non-empty.
        let u: f64 = rng.random();
        let split_value = match (min * (1.0 - u) + max * u).clamp(min, max) {
            v if v > min => v,
            _ => max,
        };

        let (left, right): (Vec<FeatureVector>, Vec<FeatureVector>) = samples
            .iter()
            .partition(|s| s.axis(feature_idx) < split_value);

        IsolationNode::Internal {
            feature_idx,
            split_value,
            left: Box::new(Self::build_node(&left, depth + 1, height_limit, rng)),
            right: Box::new(Self::build_node(&right, depth + 1, height_limit, rng)),
        }
    }

    /// Path length h(x): leaf depth plus c(leaf size)
    pub fn path_length(&self, sample: &FeatureVector) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => {
                    return depth as f64 + average_path_length(*size);
                }
                IsolationNode::Internal {
                    feature_idx,
                    split_value,
                    left,
                    right,
                } => {
                    node = if sample.axis(*feature_idx) < *split_value {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                    depth += 1;
                }
            }
        }
    }

    pub fn root(&self) -> &IsolationNode {
        &self.root
    }

    pub fn height_limit(&self) -> usize {
        self.height_limit
    }

    /// Depth of the deepest leaf
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Total points recorded across all leaves
    pub fn leaf_total(&self) -> usize {
        self.root.leaf_total()
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let mut stack = vec![(&self.root, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if depth > self.height_limit {
                return Err(format!(
                    "depth {} exceeds height limit {}",
                    depth, self.height_limit
                ));
            }
            if let IsolationNode::Internal {
                feature_idx,
                split_value,
                left,
                right,
            } = node
            {
                if *feature_idx >= NUM_FEATURES {
                    return Err(format!("feature index {} out of range", feature_idx));
                }
                if !split_value.is_finite() {
                    return Err("non-finite split value".to_string());
                }
                stack.push((left.as_ref(), depth + 1));
                stack.push((right.as_ref(), depth + 1));
            }
        }
        Ok(())
    }
}

impl Serialize for IsolationTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        FlatTree::from(self).serialize(serializer)
    }
}

#[derive(Serialize, Deserialize)]
struct FlatTree {
    height_limit: usize,
    nodes: Vec<FlatNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum FlatNode {
    Internal { feature_idx: usize, split_value: f64 },
    Leaf { size: usize },
}

impl From<&IsolationTree> for FlatTree {
    fn from(tree: &IsolationTree) -> Self {
        let mut nodes = Vec::new();
        let mut stack = vec![&tree.root];
        while let Some(node) = stack.pop() {
            match node {
                IsolationNode::Leaf { size } => nodes.push(FlatNode::Leaf { size: *size }),
                IsolationNode::Internal {
                    feature_idx,
                    split_value,
                    left,
                    right,
                } => {
                    nodes.push(FlatNode::Internal {
                        feature_idx: *feature_idx,
                        split_value: *split_value,
                    });
                    stack.push(right.as_ref());
                    stack.push(left.as_ref());
                }
            }
        }
        Self {
            height_limit: tree.height_limit,
            nodes,
        }
    }
}

impl TryFrom<FlatTree> for IsolationTree {
    type Error = String;

    fn try_from(flat: FlatTree) -> std::result::Result<Self, String> {
        let height_limit = flat.height_limit;
        if height_limit > MAX_HEIGHT_LIMIT {
            return Err(format!("height limit {} out of range", height_limit));
        }

        // In reverse pre-order both subtrees of a node are complete before
        // the node itself is reached.
        let mut stack: Vec<(IsolationNode, usize)> = Vec::new();
        for node in flat.nodes.into_iter().rev() {
            match node {
                FlatNode::Leaf { size } => stack.push((IsolationNode::Leaf { size }, 0)),
                FlatNode::Internal {
                    feature_idx,
                    split_value,
                } => {
                    let (Some((left, left_depth)), Some((right, right_depth))) =
                        (stack.pop(), stack.pop())
                    else {
                        return Err("internal node is missing a child".to_string());
                    };
                    let depth = 1 + left_depth.max(right_depth);
                    if depth > height_limit {
                        return Err(format!(
                            "depth {} exceeds height limit {}",
                            depth, height_limit
                        ));
                    }
                    let node = IsolationNode::Internal {
                        feature_idx,
                        split_value,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    stack.push((node, depth));
                }
            }
        }

        match (stack.pop(), stack.is_empty()) {
            (Some((root, _)), true) => Ok(Self { root, height_limit }),
            _ => Err("tree does not have exactly one root".to_string()),
        }
    }
}

/// Node in an isolation tree
#[derive(Debug, Clone, PartialEq)]
pub enum IsolationNode {
    /// Internal node with split; left holds `value < split_value`
    Internal {
        feature_idx: usize,
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    /// Leaf node
    Leaf { size: usize },
}

impl IsolationNode {
    fn depth(&self) -> usize {
        match self {
            IsolationNode::Leaf { .. } => 0,
            IsolationNode::Internal { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn leaf_total(&self) -> usize {
        match self {
            IsolationNode::Leaf { size } => *size,
            IsolationNode::Internal { left, right, .. } => left.leaf_total() + right.leaf_total(),
        }
    }
}

fn axis_range(samples: &[FeatureVector], axis: usize) -> (f64, f64) {
    samples
        .iter()
        .map(|s| s.axis(axis))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
            (min.min(v), max.max(v))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(values: [f64; 4]) -> FeatureVector {
        FeatureVector::new(values).unwrap()
    }

    /// 100 points inside lat [10,11], lon [70,71], temp [20,30], humidity [40,60]
    fn cluster(n: usize, seed: u64) -> Vec<FeatureVector> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                fv([
                    rng.random_range(10.0..11.0),
                    rng.random_range(70.0..71.0),
                    rng.random_range(20.0..30.0),
                    rng.random_range(40.0..60.0),
                ])
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);

        // 2 * H(2) - 2 * 2 / 3
        let expected = 2.0 * 1.5 - 4.0 / 3.0;
        assert!((average_path_length(3) - expected).abs() < 1e-12);

        let c_10 = average_path_length(10);
        let c_256 = average_path_length(256);
        assert!(c_256 > c_10, "c(256)={} should be > c(10)={}", c_256, c_10);
        assert!((c_256 - 10.24).abs() < 0.01);
    }

    #[test]
    fn test_height_limit() {
        assert_eq!(height_limit(0), 1);
        assert_eq!(height_limit(1), 1);
        assert_eq!(height_limit(2), 1);
        assert_eq!(height_limit(100), 7);
        assert_eq!(height_limit(256), 8);
        assert_eq!(height_limit(257), 9);
    }

    #[test]
    fn test_train_empty_is_insufficient() {
        let result = IsolationForest::train(&[], &ModelConfig::default());
        assert!(matches!(result, Err(MlError::InsufficientData)));
    }

    #[test]
    fn test_train_rejects_bad_config() {
        let data = cluster(10, 1);
        let config = ModelConfig::default().with_trees(0);
        assert!(matches!(
            IsolationForest::train(&data, &config),
            Err(MlError::Config(_))
        ));
    }

    #[test]
    fn test_forest_shape() {
        let data = cluster(100, 3);
        let config = ModelConfig::default().with_trees(25);
        let forest = IsolationForest::train(&data, &config).unwrap();

        assert_eq!(forest.num_trees(), 25);
        assert_eq!(forest.sample_size(), 100);
        for tree in forest.trees() {
            assert_eq!(tree.height_limit(), 7);
            assert!(tree.depth() <= tree.height_limit());
            assert_eq!(tree.leaf_total(), 100);
        }
        assert!(forest.validate().is_ok());
    }

    #[test]
    fn test_subsample_capped_by_sample_size() {
        let data = cluster(300, 4);
        let config = ModelConfig::default().with_trees(5).with_sample_size(64);
        let forest = IsolationForest::train(&data, &config).unwrap();

        assert_eq!(forest.sample_size(), 64);
        for tree in forest.trees() {
            assert_eq!(tree.leaf_total(), 64);
            assert_eq!(tree.height_limit(), 6);
        }
    }

    #[test]
    fn test_training_is_deterministic() {
        let data = cluster(150, 5);
        let config = ModelConfig::default().with_trees(30).with_seed(7);

        let a = IsolationForest::train(&data, &config).unwrap();
        let b = IsolationForest::train(&data, &config).unwrap();
        assert_eq!(a, b);

        let probe = fv([10.2, 70.9, 28.0, 45.0]);
        assert_eq!(a.score(&probe).to_bits(), b.score(&probe).to_bits());

        let c = IsolationForest::train(&data, &config.clone().with_seed(8)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let data = cluster(120, 6);
        let config = ModelConfig::default().with_trees(40);

        let sequential = IsolationForest::fit(&data, &config, false).unwrap();
        let parallel = IsolationForest::fit(&data, &config, true).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_separation() {
        let data = cluster(100, 11);
        let forest = IsolationForest::train(&data, &ModelConfig::default()).unwrap();

        let normal = fv([10.5, 70.5, 25.0, 50.0]);
        let anomalous = fv([100.0, 100.0, 5.0, 10.0]);
        let normal_score = forest.score(&normal);
        let anomalous_score = forest.score(&anomalous);

        assert!((0.0..=1.0).contains(&normal_score));
        assert!((0.0..=1.0).contains(&anomalous_score));
        assert!(normal_score < 0.5, "normal score {}", normal_score);
        assert!(anomalous_score > 0.5, "anomalous score {}", anomalous_score);
        assert!(!forest.predict(&normal, 0.5));
        assert!(forest.predict(&anomalous, 0.5));
    }

    #[test]
    fn test_scores_rise_with_distance_from_centroid() {
        let data = cluster(200, 12);
        let forest = IsolationForest::train(&data, &ModelConfig::default()).unwrap();

        let centroid = [10.5, 70.5, 25.0, 50.0];
        let half_width = [0.5, 0.5, 5.0, 10.0];

        // Average over the 16 diagonal directions
        let mean_score_at = |factor: f64| {
            let mut total = 0.0;
            for signs in 0..16u32 {
                let mut values = centroid;
                for axis in 0..4 {
                    let sign = if signs & (1 << axis) != 0 { 1.0 } else { -1.0 };
                    values[axis] += sign * factor * half_width[axis];
                }
                total += forest.score(&fv(values));
            }
            total / 16.0
        };

        let factors = [0.0, 0.5, 1.0, 2.0, 4.0];
        let means: Vec<f64> = factors.iter().map(|&f| mean_score_at(f)).collect();
        for pair in means.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-3, "scores not rising: {:?}", means);
        }
        assert!(means[4] > means[0]);
    }

    #[test]
    fn test_single_point_forest_is_neutral() {
        let data = vec![fv([0.0, 0.0, 25.0, 50.0])];
        let forest = IsolationForest::train(&data, &ModelConfig::default()).unwrap();

        assert_eq!(forest.sample_size(), 1);
        assert_eq!(forest.score(&fv([0.0, 0.0, 25.0, 50.0])), 0.5);
        assert_eq!(forest.score(&fv([90.0, -120.0, 60.0, 0.0])), 0.5);
        assert!(forest.validate().is_ok());
    }

    #[test]
    fn test_degenerate_axes_make_leaf() {
        let data = vec![fv([1.0, 2.0, 3.0, 4.0]); 8];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = IsolationTree::build(&data, &mut rng);

        assert_eq!(tree.root(), &IsolationNode::Leaf { size: 8 });
        assert_eq!(tree.path_length(&data[0]), average_path_length(8));
    }

    #[test]
    fn test_score_batch_matches_single() {
        let data = cluster(64, 13);
        let forest = IsolationForest::train(&data, &ModelConfig::default().with_trees(20)).unwrap();
        let batch = forest.score_batch(&data);
        for (sample, score) in data.iter().zip(batch) {
            assert_eq!(forest.score(sample), score);
        }
    }

    #[test]
    fn test_validate_rejects_bad_feature_index() {
        let config = ModelConfig::default().with_trees(2);
        let mut forest = IsolationForest::train(&cluster(16, 14), &config).unwrap();
        forest.trees[0].root = IsolationNode::Internal {
            feature_idx: 9,
            split_value: 1.0,
            left: Box::new(IsolationNode::Leaf { size: 1 }),
            right: Box::new(IsolationNode::Leaf { size: 1 }),
        };
        assert!(forest.validate().is_err());
    }

    /// Walk `node` alongside the subsample it was grown on, checking every
    /// split falls in (min, max] of that subsample and both sides are non-empty.
    fn assert_splits_within_range(node: &IsolationNode, samples: &[FeatureVector]) {
        match node {
            IsolationNode::Leaf { size } => assert_eq!(*size, samples.len()),
            IsolationNode::Internal {
                feature_idx,
                split_value,
                left,
                right,
            } => {
                let (min, max) = axis_range(samples, *feature_idx);
                assert!(split_value.is_finite());
                assert!(
                    min < *split_value && *split_value <= max,
                    "split {} outside ({}, {}]",
                    split_value,
                    min,
                    max
                );
                let (l, r): (Vec<FeatureVector>, Vec<FeatureVector>) = samples
                    .iter()
                    .partition(|s| s.axis(*feature_idx) < *split_value);
                assert!(!l.is_empty() && !r.is_empty());
                assert_splits_within_range(left, &l);
                assert_splits_within_range(right, &r);
            }
        }
    }

    fn extreme_data() -> Vec<FeatureVector> {
        vec![
            fv([1.7e308, f64::MAX, -f64::MAX, 0.0]),
            fv([-1.7e308, -f64::MAX, f64::MAX, f64::MIN_POSITIVE]),
            fv([0.0, 1.0, -1.0e300, 1.0e300]),
            fv([f64::MAX, -f64::MAX, 0.0, -f64::MAX]),
        ]
    }

    #[test]
    fn test_extreme_finite_values_train() {
        let data = extreme_data();
        let forest =
            IsolationForest::train(&data, &ModelConfig::default().with_trees(50)).unwrap();
        assert!(forest.validate().is_ok());

        for sample in data.iter().chain([fv([0.0, 0.0, 25.0, 50.0])].iter()) {
            let score = forest.score(sample);
            assert!(score.is_finite() && (0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_split_values_within_node_range() {
        let mut rng = StdRng::seed_from_u64(21);
        for data in [cluster(64, 15), extreme_data()] {
            for _ in 0..20 {
                let tree = IsolationTree::build(&data, &mut rng);
                assert_splits_within_range(tree.root(), &data);
            }
        }
    }

    #[test]
    fn test_tree_encoding_round_trip() {
        let forest =
            IsolationForest::train(&cluster(50, 16), &ModelConfig::default().with_trees(10))
                .unwrap();
        let bytes = bincode::serde::encode_to_vec(&forest, bincode::config::standard()).unwrap();
        let (decoded, _): (IsolationForest, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded, forest);
    }

    #[test]
    fn test_decoding_rejects_malformed_trees() {
        let decode = |flat: &FlatTree| {
            let bytes = bincode::serde::encode_to_vec(flat, bincode::config::standard()).unwrap();
            let config = bincode::config::standard();
            bincode::serde::decode_from_slice::<IsolationTree, _>(&bytes, config)
        };
        let internal = FlatNode::Internal {
            feature_idx: 0,
            split_value: 1.0,
        };
        let leaf = FlatNode::Leaf { size: 1 };

        // A left-deep chain far deeper than its declared limit
        let mut nodes = vec![internal; 10_000];
        nodes.extend(std::iter::repeat(leaf).take(10_001));
        assert!(decode(&FlatTree {
            height_limit: 8,
            nodes,
        })
        .is_err());

        // Missing child
        assert!(decode(&FlatTree {
            height_limit: 8,
            nodes: vec![internal, leaf],
        })
        .is_err());

        // Two roots
        assert!(decode(&FlatTree {
            height_limit: 8,
            nodes: vec![leaf, leaf],
        })
        .is_err());

        assert!(decode(&FlatTree {
            height_limit: 1_000,
            nodes: vec![leaf],
        })
        .is_err());

        let tree = decode(&FlatTree {
            height_limit: 1,
            nodes: vec![internal, leaf, leaf],
        })
        .unwrap()
        .0;
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.leaf_total(), 2);
    }
}
