#![deny(missing_docs)]

//! Binned histograms keyed by energy values.
//!
//! Every estimator in MCS (incidence counters, log density of states, optimal
//! ensemble weights) is a [`Histogram`]. Keys pass through a [`Binning`] on
//! every access, so reads and writes at nearby energies land in the same bin.

/// Key-mapping functions.
pub mod binning;
/// The histogram container and its statistics.
pub mod histogram;
/// Numeric bin value contract.
pub mod value;

pub use binning::Binning;
pub use histogram::Histogram;
pub use value::BinValue;
