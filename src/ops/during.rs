//! `During` windows (`spec.md` §4.2): `(start?, end?)` bounds that gate
//! whether an operation applies in the current year.

use serde::{Deserialize, Serialize};

use super::Operation;
use crate::error::CoreResult;
use crate::state::UseKey;

/// One bound of a `During` window: a literal year, an expression evaluated
/// against the engine, or one of the open markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DuringBound {
    Year(i64),
    Expr(Box<Operation>),
    /// `beginning` — the scenario's start year.
    Beginning,
    /// `onwards` — open-ended; only valid as an end bound.
    Onwards,
}

/// `(start?, end?)`. A missing bound is open on that side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct During {
    pub start: Option<DuringBound>,
    pub end: Option<DuringBound>,
}

impl During {
    pub fn always() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Resolves `self` against the current year, returning whether the
    /// operation this `During` gates is a no-op for the current year
    /// (`spec.md` §4.2: "An operation is a no-op for the current year iff
    /// `During` is present and the current year lies outside the resolved
    /// range").
    pub fn is_active(
        &self,
        engine: &mut crate::engine::RecalculationEngine,
        key: &UseKey,
        year: i64,
    ) -> CoreResult<bool> {
        let start = match &self.start {
            None | Some(DuringBound::Beginning) => engine.start_year(),
            Some(DuringBound::Onwards) => engine.start_year(),
            Some(DuringBound::Year(y)) => *y,
            Some(DuringBound::Expr(op)) => resolve_year(engine, key, op)?,
        };
        let end = match &self.end {
            None | Some(DuringBound::Onwards) => engine.end_year(),
            Some(DuringBound::Beginning) => engine.start_year(),
            Some(DuringBound::Year(y)) => *y,
            Some(DuringBound::Expr(op)) => resolve_year(engine, key, op)?,
        };
        Ok(year >= start && year <= end)
    }
}

fn resolve_year(
    engine: &mut crate::engine::RecalculationEngine,
    key: &UseKey,
    op: &Operation,
) -> CoreResult<i64> {
    let value = super::eval_value(engine, key, op)?;
    Ok(value.value.trunc().to_string().parse::<i64>().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RecalculationEngine;
    use crate::num::Num;

    #[test]
    fn unbounded_during_is_active_every_year() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 5);
        let key = UseKey::new("App", "Sub");
        let during = During::always();
        assert!(during.is_active(&mut engine, &key, 1).unwrap());
        assert!(during.is_active(&mut engine, &key, 5).unwrap());
    }

    #[test]
    fn literal_year_bounds_gate_outside_years() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 5);
        let key = UseKey::new("App", "Sub");
        let during = During {
            start: Some(DuringBound::Year(2)),
            end: Some(DuringBound::Year(3)),
        };
        assert!(!during.is_active(&mut engine, &key, 1).unwrap());
        assert!(during.is_active(&mut engine, &key, 2).unwrap());
        assert!(during.is_active(&mut engine, &key, 3).unwrap());
        assert!(!during.is_active(&mut engine, &key, 4).unwrap());
    }

    #[test]
    fn onwards_end_bound_is_open_ended() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 10);
        let key = UseKey::new("App", "Sub");
        let during = During {
            start: Some(DuringBound::Year(3)),
            end: Some(DuringBound::Onwards),
        };
        assert!(!during.is_active(&mut engine, &key, 2).unwrap());
        assert!(during.is_active(&mut engine, &key, 3).unwrap());
        assert!(during.is_active(&mut engine, &key, 10).unwrap());
    }

    #[test]
    fn expr_bound_evaluates_against_the_engine() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 10);
        let key = UseKey::new("App", "Sub");
        let during = During {
            start: Some(DuringBound::Expr(Box::new(Operation::PreCalculated(Num::dimensionless(
                rust_decimal::Decimal::from(4),
            ))))),
            end: None,
        };
        assert!(!during.is_active(&mut engine, &key, 3).unwrap());
        assert!(during.is_active(&mut engine, &key, 4).unwrap());
    }
}
