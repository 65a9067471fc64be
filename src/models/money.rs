use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Amount in the minor currency unit. All pricing arithmetic stays integral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// `self × percent / 100`, floored to the minor unit.
    pub fn percent_of(self, percent: i64) -> Money {
        Money((self.0 * percent).div_euclid(100))
    }

    pub fn times(self, factor: i64) -> Money {
        Money(self.0.saturating_mul(factor))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distance in whole meters. Sums saturate instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Distance(u64);

impl Distance {
    pub const ZERO: Distance = Distance(0);

    pub const fn from_meters(meters: u64) -> Self {
        Self(meters)
    }

    pub const fn from_km(km: u64) -> Self {
        Self(km * 1_000)
    }

    pub const fn meters(self) -> u64 {
        self.0
    }

    /// Price of this distance at a per-km rate, rounded half-up to the minor unit.
    pub fn priced_at(self, rate_per_km: Money) -> Money {
        let raw = i128::from(self.0) * i128::from(rate_per_km.minor_units());
        let rounded = (raw + 500).div_euclid(1_000);
        Money::new(i64::try_from(rounded).unwrap_or(i64::MAX))
    }
}

impl Add for Distance {
    type Output = Distance;

    fn add(self, rhs: Distance) -> Distance {
        Distance(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Distance {
    fn sum<I: Iterator<Item = Distance>>(iter: I) -> Distance {
        iter.fold(Distance::ZERO, Add::add)
    }
}
