use std::fmt;

use mcs_core::{EnergyValue, McsError};
use serde::{Deserialize, Serialize};

/// Key-mapping function applied to every histogram access.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Binning<K> {
    /// Every key is its own bin.
    Identity,
    /// Bins of equal `width` aligned so that `reference` starts a bin.
    ConstantWidth {
        /// Width of each bin.
        width: f64,
        /// Any lower bin edge.
        reference: f64,
    },
    /// Bins labelled by their (exclusive) upper boundary.
    FixedBoundary {
        /// Sorted bin boundaries.
        boundaries: Vec<K>,
    },
    /// User supplied mapping. Not serializable.
    #[serde(skip)]
    Custom {
        /// Maps a raw key to its bin key.
        map: fn(K) -> K,
    },
}

impl<K> Binning<K> {
    /// Rejects a constant width that is not a positive finite number and a
    /// reference edge that is not finite.
    pub fn validate(&self) -> Result<(), McsError> {
        if let Binning::ConstantWidth { width, reference } = self {
            if !(width.is_finite() && *width > 0.0) {
                return Err(McsError::config("binning-width", "width", width));
            }
            if !reference.is_finite() {
                return Err(McsError::config("binning-reference", "reference", reference));
            }
        }
        Ok(())
    }
}

impl<K: EnergyValue> Binning<K> {
    /// Constant width binning.
    ///
    /// Fails with [`McsError::Config`] unless `width` is positive and finite
    /// and `reference` is finite.
    pub fn constant_width(width: f64, reference: f64) -> Result<Self, McsError> {
        let binning = Binning::ConstantWidth { width, reference };
        binning.validate()?;
        Ok(binning)
    }

    /// Fixed boundary binning; the boundaries are sorted and deduplicated.
    pub fn fixed_boundaries(mut boundaries: Vec<K>) -> Self {
        boundaries.sort();
        boundaries.dedup();
        Binning::FixedBoundary { boundaries }
    }

    /// Maps `key` to the key of the bin it falls into.
    pub fn bin(&self, key: K) -> K {
        match self {
            Binning::Identity => key,
            Binning::ConstantWidth { width, reference } => {
                let offset = (key.to_f64() - reference) / width;
                K::from_f64(reference + width * offset.floor())
            }
            Binning::FixedBoundary { boundaries } => {
                let index = boundaries.partition_point(|boundary| *boundary <= key);
                boundaries.get(index).copied().unwrap_or_else(K::upper_limit)
            }
            Binning::Custom { map } => map(key),
        }
    }
}

impl<K> Default for Binning<K> {
    fn default() -> Self {
        Binning::Identity
    }
}

impl<K: fmt::Debug> fmt::Debug for Binning<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binning::Identity => f.write_str("Identity"),
            Binning::ConstantWidth { width, reference } => f
                .debug_struct("ConstantWidth")
                .field("width", width)
                .field("reference", reference)
                .finish(),
            Binning::FixedBoundary { boundaries } => f
                .debug_struct("FixedBoundary")
                .field("boundaries", boundaries)
                .finish(),
            Binning::Custom { .. } => f.write_str("Custom"),
        }
    }
}
