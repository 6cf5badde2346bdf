//! Stratified train/test split
//!
//! Each class is shuffled on its own and contributes the same fraction of its
//! rows to the test set, so both sets keep the class proportions.

use crate::schema::FeatureVector;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Rows and class codes of one side of a split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    pub features: Vec<FeatureVector>,
    pub classes: Vec<usize>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Split into (train, test) with `test_fraction` of every class in the test set
pub fn stratified_split(
    features: &[FeatureVector],
    classes: &[usize],
    test_fraction: f64,
    seed: u64,
) -> (Split, Split) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_classes = classes.iter().max().map_or(0, |m| m + 1);

    let mut train_idx = Vec::new();
    let mut test_idx = Vec::new();

    for class in 0..n_classes {
        let mut members: Vec<usize> = classes
            .iter()
            .enumerate()
            .filter_map(|(i, c)| (*c == class).then_some(i))
            .collect();
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);

        let n = members.len();
        let mut n_test = (n as f64 * test_fraction).round() as usize;
        // keep at least one row of every class on the training side
        n_test = n_test.min(n - 1);
        if n_test == 0 && n >= 2 && test_fraction > 0.0 {
            n_test = 1;
        }

        test_idx.extend_from_slice(&members[..n_test]);
        train_idx.extend_from_slice(&members[n_test..]);
    }

    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    let gather = |idx: &[usize]| Split {
        features: idx.iter().map(|&i| features[i]).collect(),
        classes: idx.iter().map(|&i| classes[i]).collect(),
    };

    let train = gather(&train_idx);
    let test = gather(&test_idx);

    tracing::debug!(
        "Stratified split: {} training, {} test rows",
        train.len(),
        test.len()
    );

    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FEATURE_COUNT;

    fn data(per_class: &[usize]) -> (Vec<FeatureVector>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut next = 0.0;
        for (class, &n) in per_class.iter().enumerate() {
            for _ in 0..n {
                x.push([next; FEATURE_COUNT]);
                y.push(class);
                next += 1.0;
            }
        }
        (x, y)
    }

    fn count(split: &Split, class: usize) -> usize {
        split.classes.iter().filter(|c| **c == class).count()
    }

    #[test]
    fn test_split_keeps_class_proportions() {
        let (x, y) = data(&[400, 400, 400]);
        let (train, test) = stratified_split(&x, &y, 0.2, 42);
        assert_eq!(train.len(), 960);
        assert_eq!(test.len(), 240);
        for class in 0..3 {
            assert_eq!(count(&test, class), 80);
            assert_eq!(count(&train, class), 320);
        }
    }

    #[test]
    fn test_no_rows_lost_or_duplicated() {
        let (x, y) = data(&[37, 11, 52]);
        let (train, test) = stratified_split(&x, &y, 0.2, 3);
        let mut seen: Vec<f64> = train
            .features
            .iter()
            .chain(test.features.iter())
            .map(|r| r[0])
            .collect();
        seen.sort_by(f64::total_cmp);
        let expected: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_rows_keep_their_class() {
        let (x, y) = data(&[10, 10]);
        let (train, test) = stratified_split(&x, &y, 0.3, 9);
        for split in [&train, &test] {
            for (row, class) in split.features.iter().zip(split.classes.iter()) {
                assert_eq!(y[row[0] as usize], *class);
            }
        }
    }

    #[test]
    fn test_same_seed_same_split() {
        let (x, y) = data(&[30, 30, 30]);
        assert_eq!(
            stratified_split(&x, &y, 0.2, 42),
            stratified_split(&x, &y, 0.2, 42)
        );
    }
}
