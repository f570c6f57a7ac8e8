//! Energy value contract and the provided implementations.

use std::cmp::Ordering;
use std::fmt::{self, Debug, Display};
use std::ops::{Add, Sub};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Totally ordered, additive quantity used as histogram key and running total.
///
/// `Default` must yield the additive identity.
pub trait EnergyValue:
    Copy
    + Ord
    + Add<Output = Self>
    + Sub<Output = Self>
    + Default
    + Debug
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Lossy conversion used by exponentials, derivatives and binning.
    fn to_f64(self) -> f64;

    /// Conversion back from a binned floating point value.
    fn from_f64(value: f64) -> Self;

    /// Largest representable value, used as the overflow bin.
    fn upper_limit() -> Self;
}

impl EnergyValue for i32 {
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i32
    }

    fn upper_limit() -> Self {
        i32::MAX
    }
}

impl EnergyValue for i64 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value.round() as i64
    }

    fn upper_limit() -> Self {
        i64::MAX
    }
}

/// Continuous energy with a total order (`f64::total_cmp`).
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealEnergy(pub f64);

impl RealEnergy {
    /// Returns the wrapped value.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for RealEnergy {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RealEnergy {}

impl PartialOrd for RealEnergy {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RealEnergy {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add for RealEnergy {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        RealEnergy(self.0 + rhs.0)
    }
}

impl Sub for RealEnergy {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        RealEnergy(self.0 - rhs.0)
    }
}

impl Debug for RealEnergy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for RealEnergy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<f64> for RealEnergy {
    fn from(value: f64) -> Self {
        RealEnergy(value)
    }
}

impl EnergyValue for RealEnergy {
    fn to_f64(self) -> f64 {
        self.0
    }

    fn from_f64(value: f64) -> Self {
        RealEnergy(value)
    }

    fn upper_limit() -> Self {
        RealEnergy(f64::INFINITY)
    }
}
