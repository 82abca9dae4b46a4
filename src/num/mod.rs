//! Decimal & unit algebra (`spec.md` §4.1).
//!
//! [`Num`] pairs a [`rust_decimal::Decimal`] with a [`Unit`] string. All
//! stream values, operation-tree literals, and conversion results flow
//! through this type so that unit mistakes are caught at the point of use
//! rather than silently coerced.

pub mod convert;
pub mod unit;

pub use convert::{ConversionContext, convert};
pub use unit::Unit;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops;

use crate::config::ROUNDING_STRATEGY;
use crate::error::{ArithmeticError, CoreResult};

/// A decimal value tagged with a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Num {
    pub value: Decimal,
    pub units: Unit,
}

impl Num {
    pub fn new(value: Decimal, units: impl Into<Unit>) -> Self {
        Self {
            value,
            units: units.into(),
        }
    }

    pub fn zero(units: impl Into<Unit>) -> Self {
        Self::new(Decimal::ZERO, units)
    }

    pub fn dimensionless(value: Decimal) -> Self {
        Self::new(value, Unit::literal(Unit::EMPTY))
    }

    pub fn rounded(&self, scale: u32) -> Decimal {
        self.value.round_dp_with_strategy(scale, ROUNDING_STRATEGY)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Resolves a `%`-unit value to a plain fraction (`10%` → `0.1`);
    /// passes a dimensionless value through unchanged. Used wherever the
    /// engine needs a scalar fraction rather than a unit-tagged `Num`
    /// (recharge/retirement/recovery rates).
    pub fn as_fraction(&self) -> Decimal {
        if self.units.is_percent() {
            self.value / Decimal::ONE_HUNDRED
        } else {
            self.value
        }
    }

    /// Arithmetic unit-compatibility rule used by the stack machine: either
    /// side is unitless, or the units are identical.
    fn compatible(&self, other: &Num) -> bool {
        self.units.is_empty() || other.units.is_empty() || self.units == other.units
    }

    fn result_units(&self, other: &Num) -> Unit {
        if self.units.is_empty() {
            other.units.clone()
        } else {
            self.units.clone()
        }
    }

    pub fn checked_add(&self, other: &Num) -> CoreResult<Num> {
        if !self.compatible(other) {
            return Err(ArithmeticError::UnitMismatch {
                op: "add".into(),
                lhs: self.units.to_string(),
                rhs: other.units.to_string(),
            }
            .into());
        }
        Ok(Num::new(self.value + other.value, self.result_units(other)))
    }

    pub fn checked_sub(&self, other: &Num) -> CoreResult<Num> {
        if !self.compatible(other) {
            return Err(ArithmeticError::UnitMismatch {
                op: "subtract".into(),
                lhs: self.units.to_string(),
                rhs: other.units.to_string(),
            }
            .into());
        }
        Ok(Num::new(self.value - other.value, self.result_units(other)))
    }

    /// Multiplication combines units textually when one side is a pure
    /// scalar (e.g. `%`), matching "percentage is a dimensioned scalar"
    /// (`spec.md` §4.1).
    pub fn checked_mul(&self, other: &Num) -> CoreResult<Num> {
        let units = if other.units.is_empty() || other.units.is_percent() {
            self.units.clone()
        } else if self.units.is_empty() || self.units.is_percent() {
            other.units.clone()
        } else {
            return Err(ArithmeticError::UnitMismatch {
                op: "multiply".into(),
                lhs: self.units.to_string(),
                rhs: other.units.to_string(),
            }
            .into());
        };
        let scale = if other.units.is_percent() {
            Decimal::ONE_HUNDRED
        } else {
            Decimal::ONE
        };
        let factor = if other.units.is_percent() {
            other.value / scale
        } else if self.units.is_percent() {
            self.value
        } else {
            other.value
        };
        let base = if self.units.is_percent() {
            other.value
        } else {
            self.value
        };
        Ok(Num::new(base * factor, units))
    }

    pub fn checked_div(&self, other: &Num, op_name: &str) -> CoreResult<Num> {
        if other.value.is_zero() {
            return Err(ArithmeticError::DivideByZero {
                op: op_name.to_string(),
            }
            .into());
        }
        let units = if other.units.is_empty() {
            self.units.clone()
        } else if self.units == other.units {
            Unit::literal(Unit::EMPTY)
        } else {
            // e.g. kg / unit -> a ratio unit
            Unit::new(format!("{}/{}", self.units, other.units))?
        };
        Ok(Num::new(self.value / other.value, units))
    }

    pub fn checked_pow(&self, exponent: &Num) -> CoreResult<Num> {
        if !exponent.units.is_empty() {
            return Err(ArithmeticError::UnitMismatch {
                op: "power".into(),
                lhs: self.units.to_string(),
                rhs: exponent.units.to_string(),
            }
            .into());
        }
        let exp_i64 = exponent
            .value
            .to_string()
            .parse::<i64>()
            .map_err(|_| ArithmeticError::NonFinite {
                op: "power".into(),
                detail: "exponent must be an integer".into(),
            })?;
        let result = self
            .value
            .checked_powi(exp_i64)
            .ok_or_else(|| ArithmeticError::Overflow {
                op: "power".into(),
                detail: "result exceeded decimal precision".into(),
            })?;
        Ok(Num::new(result, self.units.clone()))
    }

    pub fn neg(&self) -> Num {
        Num::new(-self.value, self.units.clone())
    }
}

impl ops::Neg for Num {
    type Output = Num;
    fn neg(self) -> Num {
        Num::new(-self.value, self.units)
    }
}
