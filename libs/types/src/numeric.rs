//! Integer units for prices and sizes
//!
//! Prices are expressed in subticks and sizes in base quantums. Both are plain
//! unsigned integers so that matching arithmetic is exact and identical on
//! every node.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Price in subticks (an integer unit finer than a tick)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subticks(pub u64);

impl Subticks {
    pub fn value(&self) -> u64 {
        self.0
    }

    /// True if the price is a whole multiple of `subticks_per_tick`.
    pub fn is_multiple_of(&self, subticks_per_tick: u32) -> bool {
        subticks_per_tick != 0 && self.0 % u64::from(subticks_per_tick) == 0
    }
}

impl fmt::Display for Subticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Subticks {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Size in base quantums (smallest tradeable unit of the base asset)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseQuantums(pub u64);

impl BaseQuantums {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Signed size of a fill from the perspective of the given side.
    pub fn signed(self, is_buy: bool) -> i128 {
        let magnitude = i128::from(self.0);
        if is_buy {
            magnitude
        } else {
            -magnitude
        }
    }
}

impl fmt::Display for BaseQuantums {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BaseQuantums {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Add for BaseQuantums {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for BaseQuantums {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for BaseQuantums {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for BaseQuantums {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}
