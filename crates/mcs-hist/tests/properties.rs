use mcs_hist::{Binning, Histogram};
use proptest::prelude::*;

fn histogram_from(pairs: &[(i64, f64)]) -> Histogram<i64, f64> {
    pairs.iter().copied().collect()
}

proptest! {
    #[test]
    fn shift_bin_zero_zeroes_minimum_key(pairs in prop::collection::vec((-50i64..50, -100.0f64..100.0), 1..40)) {
        let mut histogram = histogram_from(&pairs);
        let min_key = histogram.min_key().unwrap();
        histogram.shift_bin_zero(min_key);
        prop_assert_eq!(histogram.get(min_key), 0.0);
    }

    #[test]
    fn flatness_of_non_negative_histograms_is_a_fraction(pairs in prop::collection::vec((-50i64..50, 0.0f64..1e6), 0..40)) {
        let histogram = histogram_from(&pairs);
        let flatness = histogram.flatness();
        prop_assert!((0.0..=1.0 + 1e-12).contains(&flatness), "flatness {}", flatness);
    }

    #[test]
    fn binned_inserts_sum_per_bin(width in 1i64..8, keys in prop::collection::vec(-100i64..100, 1..60)) {
        let binning = Binning::constant_width(width as f64, 0.0).unwrap();
        let mut histogram = Histogram::<i64, u64>::with_binning(binning.clone());
        for key in &keys {
            histogram.insert(*key, 1);
        }
        prop_assert_eq!(histogram.sum(), keys.len() as u64);
        for key in &keys {
            let expected = keys.iter().filter(|other| binning.bin(**other) == binning.bin(*key)).count();
            prop_assert_eq!(histogram.get(*key), expected as u64);
        }
    }
}
