use mcs_core::{McsError, RealEnergy};
use mcs_hist::{Binning, Histogram};

#[test]
fn constant_width_bins_align_on_reference() {
    let binning = Binning::<i64>::constant_width(4.0, 1.0).unwrap();
    assert_eq!(binning.bin(1), 1);
    assert_eq!(binning.bin(4), 1);
    assert_eq!(binning.bin(5), 5);
    assert_eq!(binning.bin(0), -3);
}

#[test]
fn degenerate_constant_widths_are_rejected() {
    for width in [0.0, -2.0, f64::NAN, f64::INFINITY] {
        match Binning::<i64>::constant_width(width, 0.0) {
            Err(McsError::Config(info)) => assert_eq!(info.code, "binning-width"),
            other => panic!("width {width} gave {other:?}"),
        }
    }
    assert!(Binning::<i64>::constant_width(1.0, f64::NAN).is_err());

    let literal = Binning::<i64>::ConstantWidth {
        width: 0.0,
        reference: 0.0,
    };
    assert!(literal.validate().is_err());
    assert!(Binning::<i64>::Identity.validate().is_ok());

    let json = r#"{"binning":{"type":"constant-width","width":0.0,"reference":0.0},"bins":[]}"#;
    let decoded = serde_json::from_str::<Histogram<i64, f64>>(json);
    let message = decoded.unwrap_err().to_string();
    assert!(message.contains("binning-width"), "{message}");
}

#[test]
fn fixed_boundaries_label_bins_by_upper_edge() {
    let binning = Binning::fixed_boundaries(vec![10i64, 0, 5]);
    assert_eq!(binning.bin(-3), 0);
    assert_eq!(binning.bin(0), 5);
    assert_eq!(binning.bin(7), 10);
    assert_eq!(binning.bin(10), i64::MAX);
}

#[test]
fn custom_binning_uses_supplied_function() {
    fn even(key: i64) -> i64 {
        key - key.rem_euclid(2)
    }
    let mut histogram = Histogram::<i64, u64>::with_binning(Binning::Custom { map: even });
    histogram.insert(3, 1);
    histogram.insert(2, 1);
    assert_eq!(histogram.len(), 1);
    assert_eq!(histogram.get(2), 2);
}

#[test]
fn inserts_into_the_same_bin_accumulate() {
    let mut histogram =
        Histogram::<RealEnergy, f64>::with_binning(Binning::constant_width(0.5, 0.0).unwrap());
    histogram.insert(RealEnergy(0.1), 1.0);
    histogram.insert(RealEnergy(0.4), 2.0);
    histogram.insert(RealEnergy(0.6), 5.0);
    assert_eq!(histogram.len(), 2);
    assert_eq!(histogram.get(RealEnergy(0.0)), 3.0);
    assert_eq!(histogram.get(RealEnergy(0.7)), 5.0);
    assert_eq!(histogram.keys().collect::<Vec<_>>(), vec![RealEnergy(0.0), RealEnergy(0.5)]);
}

#[test]
fn set_overwrites_the_bin() {
    let mut histogram = Histogram::<i64, f64>::with_binning(Binning::constant_width(10.0, 0.0).unwrap());
    histogram.insert(3, 1.0);
    histogram.set(7, 4.0);
    assert_eq!(histogram.get(0), 4.0);
}
