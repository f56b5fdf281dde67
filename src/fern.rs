// fern.rs -- A fixed sequence of features indexing a table of leaves.
//
// With n features the leaf table has 4^n entries; feature i contributes
// its 2-bit code at bit position 2*i of the index. Feature order is fixed
// at construction, so the index is a pure function of (fern, frame, patch).

use rand::Rng;

use crate::feature::Feature;
use crate::integral::IntegralImage;
use crate::leaf::Leaf;
use crate::rect::Rect;

/// Upper bound on features per fern (4^13 = 64M leaves).
pub const MAX_FEATURES_PER_FERN: usize = 13;

#[derive(Debug)]
pub struct Fern {
    features: Vec<Feature>,
    leaves: Vec<Leaf>,
}

impl Fern {
    /// # Panics
    /// Panics if `feature_count` is 0 or above `MAX_FEATURES_PER_FERN`.
    /// `TldConfig::validate` rejects such values before a fern is built.
    pub fn new<R: Rng + ?Sized>(feature_count: usize, min_scale: f64, max_scale: f64, rng: &mut R) -> Self {
        assert!(
            (1..=MAX_FEATURES_PER_FERN).contains(&feature_count),
            "feature count {feature_count} out of range"
        );
        let features = (0..feature_count).map(|_| Feature::new(min_scale, max_scale, rng)).collect();
        Self::from_features(features)
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        let leaf_count = 1usize << (2 * features.len());
        let leaves = (0..leaf_count).map(|_| Leaf::new()).collect();
        Fern { features, leaves }
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf(&self, index: usize) -> &Leaf {
        &self.leaves[index]
    }

    /// Pack every feature's code into one table index.
    pub fn leaf_index(&self, integral: &IntegralImage, patch: &Rect) -> usize {
        self.features
            .iter()
            .enumerate()
            .fold(0usize, |acc, (i, f)| acc | ((f.test(integral, patch) as usize) << (2 * i)))
    }

    pub fn train(&self, integral: &IntegralImage, patch: &Rect, positive: bool) {
        self.leaves[self.leaf_index(integral, patch)].increment(positive);
    }

    pub fn classify(&self, integral: &IntegralImage, patch: &Rect) -> f64 {
        self.leaves[self.leaf_index(integral, patch)].posterior()
    }

    pub fn reset(&self) {
        for leaf in &self.leaves {
            leaf.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn noise(w: usize, h: usize, seed: u64) -> Image<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        Image::from_vec(w, h, (0..w * h).map(|_| rng.gen()).collect())
    }

    #[test]
    fn test_table_size() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(Fern::new(3, 0.1, 0.5, &mut rng).leaf_count(), 64);
        assert_eq!(Fern::new(8, 0.1, 0.5, &mut rng).leaf_count(), 65_536);
    }

    #[test]
    fn test_index_packs_codes_in_order() {
        // Feature 0 sees a left-bright block (code 1 on a vertical edge),
        // feature 1 covers the whole patch (code 3 on a uniform right half).
        let mut img: Image<u8> = Image::new(8, 8);
        for y in 0..8 {
            for x in 0..2 {
                img.set(x, y, 100);
            }
        }
        let ii = IntegralImage::new(&img);
        let fern = Fern::from_features(vec![
            Feature::from_fractions(0.0, 0.0, 0.5, 1.0),
            Feature::from_fractions(0.5, 0.0, 0.5, 1.0),
        ]);
        let patch = Rect::new(0, 0, 8, 8);
        assert_eq!(fern.leaf_index(&ii, &patch), 1 | (3 << 2));
    }

    #[test]
    fn test_index_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        let fern = Fern::new(10, 0.1, 0.5, &mut rng);
        let ii = IntegralImage::new(&noise(64, 64, 9));
        let patch = Rect::new(5, 7, 40, 30);
        let first = fern.leaf_index(&ii, &patch);
        assert!(first < fern.leaf_count());
        assert_eq!(fern.leaf_index(&ii, &patch), first);
        assert_eq!(fern.classify(&ii, &patch), fern.classify(&ii, &patch));
    }

    #[test]
    fn test_train_and_reset() {
        let mut rng = StdRng::seed_from_u64(4);
        let fern = Fern::new(6, 0.1, 0.5, &mut rng);
        let ii = IntegralImage::new(&noise(32, 32, 2));
        let patch = Rect::new(2, 2, 20, 20);

        for _ in 0..5 {
            fern.train(&ii, &patch, true);
        }
        assert_eq!(fern.classify(&ii, &patch), 1.0);

        fern.train(&ii, &patch, false);
        assert!((fern.classify(&ii, &patch) - 5.0 / 6.0).abs() < 1e-12);

        fern.reset();
        assert_eq!(fern.classify(&ii, &patch), 0.0);
        assert_eq!(fern.leaf(fern.leaf_index(&ii, &patch)).counts(), (0, 0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_too_many_features_panics() {
        let mut rng = StdRng::seed_from_u64(0);
        Fern::new(14, 0.1, 0.5, &mut rng);
    }
}
