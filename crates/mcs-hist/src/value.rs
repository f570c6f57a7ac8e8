use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

/// Numeric accumulator stored in a histogram bin. `Default` is zero.
pub trait BinValue:
    Copy
    + PartialOrd
    + Default
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Send
    + Sync
{
    /// Lossy conversion used for statistics.
    fn to_f64(self) -> f64;
}

macro_rules! impl_bin_value {
    ($($ty:ty),*) => {
        $(
            impl BinValue for $ty {
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_bin_value!(f64, f32, u32, u64, i32, i64);
