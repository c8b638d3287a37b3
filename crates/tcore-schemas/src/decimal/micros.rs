//! Fixed-point money type at 1e-6 scale.
//!
//! All money amounts (cash, capital, prices) use this representation rather
//! than a binary float, per the mandatory-fixed-point-decimal invariant.
//! `Micros` wraps a raw `i64` so the type system prevents accidental mixing
//! with unrelated integers (quantities, ids).

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);
    pub const MAX: Micros = Micros(i64::MAX);
    pub const MIN: Micros = Micros(i64::MIN);
    pub const SCALE: i64 = 1_000_000;

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Build from a dollar-and-cents style f64. Only for config/fixture
    /// loading where the source value is already a human literal; never use
    /// this for accumulated or derived monetary values.
    pub fn from_f64(value: f64) -> Self {
        Micros((value * Self::SCALE as f64).round() as i64)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn checked_sub(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_sub(rhs.0).map(Micros)
    }

    #[inline]
    pub fn abs(self) -> Micros {
        Micros(self.0.saturating_abs())
    }

    #[inline]
    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    #[inline]
    pub fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Micros> {
        self.0.checked_mul(qty).map(Micros)
    }

    /// Multiply by a percentage expressed as parts-per-hundred in Micros
    /// scale (e.g. `Micros::from_f64(1.0)` means 1%).
    pub fn mul_percent(self, pct: Micros) -> Micros {
        let scaled = (self.0 as i128 * pct.0 as i128) / (Self::SCALE as i128 * 100);
        Micros(scaled as i64)
    }
}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dollars = self.0 / Self::SCALE;
        let frac = (self.0 % Self::SCALE).abs();
        if self.0 < 0 && dollars == 0 {
            write!(f, "-{dollars}.{frac:06}")
        } else {
            write!(f, "{dollars}.{frac:06}")
        }
    }
}

impl serde::Serialize for Micros {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Micros {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let f: f64 = s.parse().map_err(serde::de::Error::custom)?;
        Ok(Micros::from_f64(f))
    }
}
