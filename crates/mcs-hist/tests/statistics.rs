use mcs_hist::Histogram;

fn sample_histogram() -> Histogram<i64, f64> {
    [(-1, 3.0), (0, 1.0), (1, 2.0)].into_iter().collect()
}

#[test]
fn flatness_matches_min_over_mean() {
    let histogram = sample_histogram();
    assert!((histogram.flatness() - 0.5).abs() < 1e-12);
}

#[test]
fn flatness_of_empty_and_zero_histograms_is_zero() {
    let empty: Histogram<i64, f64> = Histogram::new();
    assert_eq!(empty.flatness(), 0.0);

    let mut zeros = sample_histogram();
    zeros.set_all(0.0);
    assert_eq!(zeros.flatness(), 0.0);
}

#[test]
fn derivative_is_centered_inside_and_one_sided_at_edges() {
    let histogram = sample_histogram();
    assert!((histogram.derivative(0).unwrap() + 0.5).abs() < 1e-12);
    assert!((histogram.derivative(-1).unwrap() + 2.0).abs() < 1e-12);
    assert!((histogram.derivative(1).unwrap() - 1.0).abs() < 1e-12);
    assert!(histogram.derivative(5).is_none());

    let single: Histogram<i64, f64> = [(4, 1.0)].into_iter().collect();
    assert!(single.derivative(4).is_none());
}

#[test]
fn min_and_max_by_key_and_value() {
    let histogram = sample_histogram();
    assert_eq!(histogram.min_key(), Some(-1));
    assert_eq!(histogram.max_key(), Some(1));
    assert_eq!(histogram.min_value(), Some((0, 1.0)));
    assert_eq!(histogram.max_value(), Some((-1, 3.0)));
    assert_eq!(histogram.sum(), 6.0);
}

#[test]
fn missing_keys_read_zero_and_materialize_on_write() {
    let mut histogram = sample_histogram();
    assert_eq!(histogram.get(7), 0.0);
    assert!(!histogram.contains(7));
    *histogram.get_mut(7) += 2.5;
    assert!(histogram.contains(7));
    assert_eq!(histogram.get(7), 2.5);
    assert_eq!(histogram.len(), 4);
}

#[test]
fn shift_bin_zero_subtracts_reference_bin() {
    let mut histogram = sample_histogram();
    let min_key = histogram.min_key().unwrap();
    histogram.shift_bin_zero(min_key);
    assert_eq!(histogram.get(min_key), 0.0);
    assert_eq!(histogram.get(0), -2.0);
    assert_eq!(histogram.get(1), -1.0);
}

#[test]
fn initialise_empty_copies_keys_with_zero_values() {
    let source = sample_histogram();
    let mut counter: Histogram<i64, u64> = [(10, 4u64)].into_iter().collect();
    counter.initialise_empty(&source);
    assert!(counter.compatible(&source));
    assert_eq!(counter.sum(), 0);
    assert_eq!(counter.count_value(0), 3);
}

#[test]
fn set_all_and_count_value() {
    let mut histogram = sample_histogram();
    assert_eq!(histogram.count_value(1.0), 1);
    histogram.set_all(1.0);
    assert_eq!(histogram.count_value(1.0), 3);
}

#[test]
fn map_values_and_retain() {
    let mut histogram = sample_histogram();
    let logs = histogram.map_values(|value| value.ln());
    assert!((logs.get(-1) - 3.0f64.ln()).abs() < 1e-12);
    histogram.retain(|key, _| key >= 0);
    assert_eq!(histogram.keys().collect::<Vec<_>>(), vec![0, 1]);
}
