//! Fixed-point quantity/price type at 1e-8 scale ("Binance standard"
//! 8-decimal-place quantization used for order quantities and position
//! sizing outputs).
//!
//! Quantization always truncates toward zero rather than rounding, so a
//! computed quantity never ends up larger than what the risk math actually
//! allows.

use std::ops::{Add, Div, Mul, Sub};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal8(i128);

impl Decimal8 {
    pub const ZERO: Decimal8 = Decimal8(0);
    pub const SCALE: i128 = 100_000_000; // 1e8

    #[inline]
    pub const fn new_raw(raw: i128) -> Self {
        Decimal8(raw)
    }

    #[inline]
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Construct from an f64, quantizing to 8 decimal places by truncation
    /// toward zero.
    pub fn from_f64(value: f64) -> Self {
        let scaled = value * Self::SCALE as f64;
        Decimal8(scaled.trunc() as i128)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn abs(self) -> Decimal8 {
        Decimal8(self.0.abs())
    }
}

impl Add for Decimal8 {
    type Output = Decimal8;
    fn add(self, rhs: Decimal8) -> Decimal8 {
        Decimal8(self.0 + rhs.0)
    }
}

impl Sub for Decimal8 {
    type Output = Decimal8;
    fn sub(self, rhs: Decimal8) -> Decimal8 {
        Decimal8(self.0 - rhs.0)
    }
}

impl Mul<i128> for Decimal8 {
    type Output = Decimal8;
    fn mul(self, rhs: i128) -> Decimal8 {
        Decimal8(self.0 * rhs)
    }
}

/// Multiply two `Decimal8` values, rescaling back down to 1e-8 (used for
/// quantity × price -> notional).
impl Mul for Decimal8 {
    type Output = Decimal8;
    fn mul(self, rhs: Decimal8) -> Decimal8 {
        let product = self.0 * rhs.0; // 1e16 scale
        Decimal8(product / Self::SCALE)
    }
}

impl Div for Decimal8 {
    type Output = Decimal8;
    fn div(self, rhs: Decimal8) -> Decimal8 {
        // Upscale the numerator before dividing so the 8-dp result keeps precision.
        let numerator = self.0 * Self::SCALE;
        Decimal8(numerator / rhs.0)
    }
}

impl std::fmt::Display for Decimal8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = (self.0 % Self::SCALE).abs();
        if self.0 < 0 && whole == 0 {
            write!(f, "-{whole}.{frac:08}")
        } else {
            write!(f, "{whole}.{frac:08}")
        }
    }
}

impl serde::Serialize for Decimal8 {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Decimal8 {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let f: f64 = s.parse().map_err(serde::de::Error::custom)?;
        Ok(Decimal8::from_f64(f))
    }
}
