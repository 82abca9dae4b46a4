//! Cumulative retirement and manual `priorEquipment` override (`spec.md`
//! §4.3 rule 6).

use rust_decimal::Decimal;

use super::RecalculationEngine;
use crate::error::CoreResult;
use crate::num::Num;
use crate::state::{RetirementState, Stream, UseKey};

/// `retire p% [during D]` / `retire V kg [during D]`.
///
/// A `%`-typed amount is cumulative within the year: it snapshots
/// `cumulativeRetireBase` on the first call and accumulates
/// `retirementPctCumulative`, so repeated percentage retirements compose
/// against one frozen base. A mass- or unit-typed amount is *absolute*: it
/// adds a fixed number of units to `previouslyApplied` regardless of the
/// current base, which is what makes the same literal amount retire the
/// same quantity every time it's issued rather than compounding
/// (`spec.md` §8 S1, "absolute-mass retire does not compound").
pub fn apply_retire(engine: &mut RecalculationEngine, key: &UseKey, amount: Num) -> CoreResult<()> {
    let weighted_charge = super::weighted_initial_charge(engine.state_mut(key)).map(|n| n.value);
    let state = engine.state_mut(key);
    let equipment = state.get(Stream::Equipment).value;
    let old_applied = state.retirement.previously_applied;

    let new_applied = if amount.units.is_percent() || amount.units.is_empty() {
        let base = *state.retirement.base.get_or_insert(equipment);
        state.retirement.pct_cumulative += amount.as_fraction();
        base * state.retirement.pct_cumulative
    } else {
        let units = if amount.units.is_population() {
            amount.value
        } else {
            let charge = weighted_charge.ok_or_else(|| {
                crate::error::UnitError::Conversion {
                    from: amount.units.to_string(),
                    to: "units".to_string(),
                    context: "no initialCharge available to convert an absolute retire amount"
                        .to_string(),
                }
            })?;
            if charge.is_zero() {
                return Err(crate::error::UnitError::Conversion {
                    from: amount.units.to_string(),
                    to: "units".to_string(),
                    context: "weighted initialCharge is zero".to_string(),
                }
                .into());
            }
            amount.value / charge
        };
        old_applied + units
    };
    state.retirement.previously_applied = new_applied;

    let delta = (new_applied - old_applied).max(Decimal::ZERO);
    if let Some(charge) = weighted_charge {
        if !delta.is_zero() {
            let leaked = delta * charge;
            let eol = state.get(Stream::EolEmissions).value;
            state.put(Stream::EolEmissions, Num::new(eol + leaked, "kg"));
        }
    }

    engine.recompute(key)
}

/// `retireWithReplacement p% [during D]` — retires as [`apply_retire`], then
/// immediately restores the fleet to its pre-retirement size by adding the
/// retired quantity back as `newEquipment`, consuming additional virgin
/// material split across the frozen distribution. Grounded in the
/// operation's name: replacement keeps the installed base flat while still
/// accounting for the leaked mass and the material cost of reinstalling.
pub fn apply_retire_with_replacement(
    engine: &mut RecalculationEngine,
    key: &UseKey,
    amount: Num,
) -> CoreResult<()> {
    let equipment_before = engine.state_mut(key).get(Stream::Equipment).value;
    apply_retire(engine, key, amount)?;
    let equipment_after = engine.state_mut(key).get(Stream::Equipment).value;
    let retired_units = (equipment_before - equipment_after).max(Decimal::ZERO);
    if retired_units.is_zero() {
        return Ok(());
    }

    let weighted_charge = super::weighted_initial_charge(engine.state_mut(key)).map(|n| n.value);
    let Some(charge) = weighted_charge else {
        return Ok(());
    };
    let replacement_mass = retired_units * charge;

    let state = engine.state_mut(key);
    let weights = state.distribution.unwrap_or_else(crate::state::Distribution::all_domestic);
    for stream in [Stream::Domestic, Stream::Import, Stream::Export] {
        let share = replacement_mass * weights.weight_for(stream);
        if share.is_zero() {
            continue;
        }
        let current = state.get(stream).value;
        state.put(stream, Num::new(current + share, "kg"));
    }

    engine.recompute(key)
}

/// `set priorEquipment to V` after at least one `retire` ran this year
/// rescales the retirement base and the cumulative amount applied so far
/// *proportionally*, preserving `appliedFraction == cumulativePct` against
/// the redeclared population, rather than discarding the cumulative
/// percentage outright (`spec.md` §4.3 rule 6: "the base and the applied
/// amount are proportionally rescaled"; §8 S3).
pub fn override_prior_equipment(
    engine: &mut RecalculationEngine,
    key: &UseKey,
    value: Num,
) -> CoreResult<()> {
    let state = engine.state_mut(key);
    let old_prior = state.get(Stream::PriorEquipment).value;
    state.put(Stream::PriorEquipment, value.clone());
    state.put(Stream::Equipment, value.clone());

    match state.retirement.base {
        Some(old_base) if !old_prior.is_zero() => {
            let ratio = value.value / old_prior;
            let new_base = old_base * ratio;
            let new_applied = state.retirement.previously_applied * ratio;
            state.retirement.base = Some(new_base);
            state.retirement.previously_applied = new_applied;
            state.retirement.applied_at_last_override = new_applied;
        }
        _ => state.retirement = RetirementState::default(),
    }

    engine.recompute(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SalesStream;
    use rust_decimal_macros::dec;

    fn key(app: &str, sub: &str) -> UseKey {
        UseKey::new(app, sub)
    }

    #[test]
    fn percent_retire_accumulates_eol_emissions_via_weighted_charge() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);
        engine
            .set_initial_charge(&k, SalesStream::Domestic, Num::new(dec!(1), "kg/unit"))
            .unwrap();
        engine
            .set_equals(&k, Num::new(dec!(1000), "kgCO2e/kg"))
            .unwrap();
        override_prior_equipment(&mut engine, &k, Num::new(dec!(100), "units")).unwrap();

        apply_retire(&mut engine, &k, Num::new(dec!(10), "%")).unwrap();

        let eol = engine.store().get(&k).unwrap().get(Stream::EolEmissions).value;
        // 10 retired units x 1 kg/unit charge = 10 kg leaked.
        assert_eq!(eol, dec!(10));
    }

    #[test]
    fn retire_with_replacement_restores_fleet_size() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);
        engine
            .set_initial_charge(&k, SalesStream::Domestic, Num::new(dec!(1), "kg/unit"))
            .unwrap();
        override_prior_equipment(&mut engine, &k, Num::new(dec!(100), "units")).unwrap();

        let before = engine.store().get(&k).unwrap().get(Stream::Equipment).value;
        apply_retire_with_replacement(&mut engine, &k, Num::new(dec!(10), "%")).unwrap();
        let after = engine.store().get(&k).unwrap().get(Stream::Equipment).value;

        assert_eq!(before, after);
    }

    #[test]
    fn retire_with_replacement_is_a_no_op_when_nothing_retires() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);

        apply_retire_with_replacement(&mut engine, &k, Num::new(dec!(10), "%")).unwrap();

        assert_eq!(
            engine.store().get(&k).unwrap().get(Stream::Equipment).value,
            Decimal::ZERO
        );
    }
}
