use std::cmp::Ordering;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

use mcs_core::errors::ErrorInfo;
use mcs_core::{EnergyValue, McsError};
use serde::de::Deserializer;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::binning::Binning;
use crate::value::BinValue;

/// Ordered, binned mapping from an energy key to an accumulator value.
#[derive(Debug, Clone)]
pub struct Histogram<K, V> {
    bins: BTreeMap<K, V>,
    binning: Binning<K>,
}

impl<K: EnergyValue, V: BinValue> Default for Histogram<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EnergyValue, V: BinValue> Histogram<K, V> {
    /// Creates an empty histogram with identity binning.
    pub fn new() -> Self {
        Self::with_binning(Binning::Identity)
    }

    /// Creates an empty histogram using the given binning.
    pub fn with_binning(binning: Binning<K>) -> Self {
        Self {
            bins: BTreeMap::new(),
            binning,
        }
    }

    /// Binning applied to every key.
    pub fn binning(&self) -> &Binning<K> {
        &self.binning
    }

    /// Key of the bin `key` falls into.
    pub fn bin_key(&self, key: K) -> K {
        self.binning.bin(key)
    }

    /// Number of populated bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Whether no bin has been materialized.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Whether the bin containing `key` exists.
    pub fn contains(&self, key: K) -> bool {
        self.bins.contains_key(&self.bin_key(key))
    }

    /// Value of the bin containing `key`, zero if absent.
    pub fn get(&self, key: K) -> V {
        self.bins
            .get(&self.bin_key(key))
            .copied()
            .unwrap_or_default()
    }

    /// Mutable access to the bin containing `key`, materializing it at zero.
    pub fn get_mut(&mut self, key: K) -> &mut V {
        let bin = self.bin_key(key);
        self.bins.entry(bin).or_default()
    }

    /// Overwrites the bin containing `key`.
    pub fn set(&mut self, key: K, value: V) {
        let bin = self.bin_key(key);
        self.bins.insert(bin, value);
    }

    /// Accumulates `value` into the bin containing `key`.
    pub fn insert(&mut self, key: K, value: V) {
        *self.get_mut(key) += value;
    }

    /// Removes the bin containing `key`.
    pub fn remove(&mut self, key: K) -> Option<V> {
        let bin = self.bin_key(key);
        self.bins.remove(&bin)
    }

    /// Drops every bin.
    pub fn clear(&mut self) {
        self.bins.clear();
    }

    /// Iterates over `(bin, value)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.bins.iter().map(|(key, value)| (*key, *value))
    }

    /// Iterates mutably over the values in key order.
    pub fn values_mut(&mut self) -> btree_map::ValuesMut<'_, K, V> {
        self.bins.values_mut()
    }

    /// Bin keys in order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.bins.keys().copied()
    }

    /// Bin values in key order.
    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.bins.values().copied()
    }

    /// Assigns `value` to every existing bin.
    pub fn set_all(&mut self, value: V) {
        for slot in self.bins.values_mut() {
            *slot = value;
        }
    }

    /// Sum over all bins.
    pub fn sum(&self) -> V {
        self.bins
            .values()
            .fold(V::default(), |acc, value| acc + *value)
    }

    /// Number of bins holding exactly `value`.
    pub fn count_value(&self, value: V) -> usize {
        self.bins.values().filter(|slot| **slot == value).count()
    }

    /// Smallest bin key.
    pub fn min_key(&self) -> Option<K> {
        self.bins.keys().next().copied()
    }

    /// Largest bin key.
    pub fn max_key(&self) -> Option<K> {
        self.bins.keys().next_back().copied()
    }

    /// Bin with the smallest value. Ties resolve to the smallest key.
    pub fn min_value(&self) -> Option<(K, V)> {
        self.iter().fold(None, |best, (key, value)| match best {
            Some((_, current)) if compare(value, current) != Ordering::Less => best,
            _ => Some((key, value)),
        })
    }

    /// Bin with the largest value. Ties resolve to the smallest key.
    pub fn max_value(&self) -> Option<(K, V)> {
        self.iter().fold(None, |best, (key, value)| match best {
            Some((_, current)) if compare(value, current) != Ordering::Greater => best,
            _ => Some((key, value)),
        })
    }

    /// Ratio of the minimal value to the mean value.
    ///
    /// Returns 0 for an empty histogram or a vanishing sum.
    pub fn flatness(&self) -> f64 {
        if self.bins.is_empty() {
            return 0.0;
        }
        let sum = self.sum().to_f64();
        if sum == 0.0 {
            return 0.0;
        }
        let mean = sum / self.bins.len() as f64;
        let minimum = self
            .min_value()
            .map(|(_, value)| value.to_f64())
            .unwrap_or(0.0);
        minimum / mean
    }

    /// Finite difference of the values at `key` using its order neighbours.
    ///
    /// Centered inside the histogram and one-sided at the two extremal bins.
    /// `None` if the bin is absent or the histogram holds fewer than two bins.
    pub fn derivative(&self, key: K) -> Option<f64> {
        let key = self.bin_key(key);
        let value = self.bins.get(&key)?.to_f64();
        let below = self.bins.range(..key).next_back();
        let above = self
            .bins
            .range((std::ops::Bound::Excluded(key), std::ops::Bound::Unbounded))
            .next();
        let (low_key, low_value, high_key, high_value) = match (below, above) {
            (Some((lk, lv)), Some((hk, hv))) => (*lk, lv.to_f64(), *hk, hv.to_f64()),
            (None, Some((hk, hv))) => (key, value, *hk, hv.to_f64()),
            (Some((lk, lv)), None) => (*lk, lv.to_f64(), key, value),
            (None, None) => return None,
        };
        Some((high_value - low_value) / (high_key.to_f64() - low_key.to_f64()))
    }

    /// Subtracts the value of the bin containing `key` from every bin.
    pub fn shift_bin_zero(&mut self, key: K) {
        let reference = self.get(key);
        for value in self.bins.values_mut() {
            *value -= reference;
        }
    }

    /// Replaces the contents with the key set of `other`, every value zero.
    pub fn initialise_empty<W>(&mut self, other: &Histogram<K, W>) {
        self.bins = other.bins.keys().map(|key| (*key, V::default())).collect();
        self.binning = other.binning.clone();
    }

    /// Whether both histograms share the same key set.
    pub fn compatible<W>(&self, other: &Histogram<K, W>) -> bool {
        self.bins.len() == other.bins.len() && self.bins.keys().eq(other.bins.keys())
    }

    /// Applies `map` to every value, keeping keys and binning.
    pub fn map_values<W: BinValue>(&self, map: impl Fn(V) -> W) -> Histogram<K, W> {
        Histogram {
            bins: self
                .bins
                .iter()
                .map(|(key, value)| (*key, map(*value)))
                .collect(),
            binning: self.binning.clone(),
        }
    }

    /// Keeps only the bins for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(K, V) -> bool) {
        self.bins.retain(|key, value| keep(*key, *value));
    }

    /// Elementwise sum with a compatible histogram.
    pub fn try_add(&self, other: &Self) -> Result<Self, McsError> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Elementwise difference with a compatible histogram.
    pub fn try_sub(&self, other: &Self) -> Result<Self, McsError> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Elementwise product with a compatible histogram.
    pub fn try_mul(&self, other: &Self) -> Result<Self, McsError> {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    /// Elementwise quotient with a compatible histogram.
    pub fn try_div(&self, other: &Self) -> Result<Self, McsError> {
        self.zip_with(other, "div", |a, b| a / b)
    }

    fn zip_with(
        &self,
        other: &Self,
        operation: &str,
        combine: impl Fn(V, V) -> V,
    ) -> Result<Self, McsError> {
        if !self.compatible(other) {
            return Err(McsError::Incompatible(
                ErrorInfo::new("histogram-incompatible", "histogram key sets differ")
                    .with_context("operation", operation)
                    .with_context("left_bins", self.bins.len())
                    .with_context("right_bins", other.bins.len()),
            ));
        }
        let bins = self
            .bins
            .iter()
            .zip(other.bins.values())
            .map(|((key, left), right)| (*key, combine(*left, *right)))
            .collect();
        Ok(Self {
            bins,
            binning: self.binning.clone(),
        })
    }
}

fn compare<V: PartialOrd>(a: V, b: V) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

impl<K: EnergyValue, V: BinValue> FromIterator<(K, V)> for Histogram<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut histogram = Self::new();
        for (key, value) in iter {
            histogram.insert(key, value);
        }
        histogram
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for Histogram<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.bins == other.bins
    }
}

macro_rules! scalar_ops {
    ($op:ident, $method:ident, $assign:ident, $assign_method:ident) => {
        impl<K: EnergyValue, V: BinValue> $assign<V> for Histogram<K, V> {
            fn $assign_method(&mut self, rhs: V) {
                for value in self.bins.values_mut() {
                    value.$assign_method(rhs);
                }
            }
        }

        impl<K: EnergyValue, V: BinValue> $op<V> for Histogram<K, V> {
            type Output = Self;

            fn $method(mut self, rhs: V) -> Self {
                self.$assign_method(rhs);
                self
            }
        }
    };
}

scalar_ops!(Add, add, AddAssign, add_assign);
scalar_ops!(Sub, sub, SubAssign, sub_assign);
scalar_ops!(Mul, mul, MulAssign, mul_assign);
scalar_ops!(Div, div, DivAssign, div_assign);

impl<K: Serialize, V: Serialize> Serialize for Histogram<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bins: Vec<(&K, &V)> = self.bins.iter().collect();
        let mut state = serializer.serialize_struct("Histogram", 2)?;
        state.serialize_field("binning", &self.binning)?;
        state.serialize_field("bins", &bins)?;
        state.end()
    }
}

impl<'de, K, V> Deserialize<'de> for Histogram<K, V>
where
    K: Ord + Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Repr<K, V> {
            binning: Binning<K>,
            bins: Vec<(K, V)>,
        }

        let repr = Repr::<K, V>::deserialize(deserializer)?;
        repr.binning.validate().map_err(serde::de::Error::custom)?;
        Ok(Histogram {
            bins: repr.bins.into_iter().collect(),
            binning: repr.binning,
        })
    }
}
