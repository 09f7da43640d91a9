//! Unit newtypes for the quantities stored on the network model.
//!
//! The model keeps engineering units (MW, MVAr, MVA, kV, degrees) while the
//! solvers work in per-unit on the system MVA base and in radians. The
//! wrappers below make the boundary explicit: every conversion into solver
//! space goes through [`Megawatts::to_pu`] and friends, and every value
//! written back goes through the matching `from_pu`.
//!
//! ```
//! use volt_core::units::{Degrees, Megawatts};
//!
//! let p = Megawatts(70.0);
//! assert!((p.to_pu(100.0) - 0.7).abs() < 1e-12);
//! assert_eq!(Megawatts::from_pu(0.5, 100.0), Megawatts(50.0));
//!
//! let angle = Degrees(-3.1679).to_radians();
//! assert!((angle.value() + 0.05529).abs() < 1e-4);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }
    };
}

/// Power quantities that are normalized by the system MVA base.
macro_rules! impl_power_base {
    ($type:ty) => {
        impl $type {
            /// Per-unit value on the given MVA base
            #[inline]
            pub fn to_pu(self, base_mva: f64) -> f64 {
                self.0 / base_mva
            }

            /// Engineering value from a per-unit quantity on the given MVA base
            #[inline]
            pub fn from_pu(pu: f64, base_mva: f64) -> Self {
                Self(pu * base_mva)
            }
        }
    };
}

/// Active power (MW)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Megawatts(pub f64);

impl_unit_ops!(Megawatts, "MW");
impl_power_base!(Megawatts);

/// Reactive power (MVAr)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Megavars(pub f64);

impl_unit_ops!(Megavars, "MVAr");
impl_power_base!(Megavars);

/// Apparent power (MVA), used for branch thermal ratings
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MegavoltAmperes(pub f64);

impl_unit_ops!(MegavoltAmperes, "MVA");
impl_power_base!(MegavoltAmperes);

/// Voltage magnitude in per-unit of the bus base voltage
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct PerUnit(pub f64);

impl_unit_ops!(PerUnit, "pu");

impl PerUnit {
    pub const ONE: Self = Self(1.0);
}

/// Base voltage (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

/// Angle in radians; what every matrix in the solvers is expressed in
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Radians(pub f64);

impl_unit_ops!(Radians, "rad");

/// Angle in degrees; what solved bus angles are reported in
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Degrees(pub f64);

impl_unit_ops!(Degrees, "deg");

impl Radians {
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }

    pub const ZERO: Self = Self(0.0);
}

impl Degrees {
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }

    pub const ZERO: Self = Self(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_megawatts_arithmetic() {
        let p1 = Megawatts(100.0);
        let p2 = Megawatts(50.0);

        assert_eq!((p1 + p2).value(), 150.0);
        assert_eq!((p1 - p2).value(), 50.0);
        assert_eq!((-p1).value(), -100.0);
        assert_eq!((p1 * 2.0).value(), 200.0);
        assert_eq!((p1 / 2.0).value(), 50.0);
    }

    #[test]
    fn test_per_unit_roundtrip_on_base() {
        let q = Megavars(-35.0);
        assert!((q.to_pu(100.0) + 0.35).abs() < 1e-12);
        assert_eq!(Megavars::from_pu(q.to_pu(100.0), 100.0), q);

        let rate = MegavoltAmperes(40.0);
        assert!((rate.to_pu(100.0) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_angle_conversion() {
        let rad = Degrees(180.0).to_radians();
        assert!((rad.value() - std::f64::consts::PI).abs() < 1e-12);
        assert!((rad.to_degrees().value() - 180.0).abs() < 1e-12);
    }

    #[test]
    fn test_sum_iterator() {
        let total: Megawatts = vec![Megawatts(10.0), Megawatts(20.0), Megawatts(40.0)]
            .into_iter()
            .sum();
        assert_eq!(total.value(), 70.0);
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&Megawatts(12.5)).unwrap();
        assert_eq!(json, "12.5");
        let back: Degrees = serde_json::from_str("-3.5").unwrap();
        assert_eq!(back, Degrees(-3.5));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Megawatts(100.0)), "100.0000 MW");
        assert_eq!(format!("{}", PerUnit(1.0)), "1.0000 pu");
    }
}
