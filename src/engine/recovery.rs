//! Recovery and recycling with yield and induction (`spec.md` §4.3 rule 7).

use rust_decimal::Decimal;

use super::RecalculationEngine;
use crate::error::CoreResult;
use crate::num::Num;
use crate::state::{Distribution, RecoverySpec, RecoveryStage, Stream, UseKey};

/// `recover V y% [stage=EOL|RECHARGE] [with i% induction]`.
///
/// `i = 0` is pure displacement (recovered mass substitutes for virgin
/// sales 1:1); `i = 1` is pure induction (recovered mass adds to total
/// supply); values in between blend linearly. The recharge-stage share is
/// also tracked as `recycleRecharge`, which the recalculation engine nets
/// against `rechargeEmissions` for reporting (`spec.md` §9 Open Questions:
/// "recovery reduces reported recharge but not the recharge-demand
/// source" — the demand itself, `priorEquipment × rechargePct ×
/// rechargeVolumePerUnit`, is untouched by this function).
pub fn apply_recover(
    engine: &mut RecalculationEngine,
    key: &UseKey,
    volume: Num,
    reuse_yield: Num,
    stage: RecoveryStage,
    induction: Option<Num>,
) -> CoreResult<()> {
    let induction_frac = induction.map(|n| n.as_fraction()).unwrap_or(Decimal::ZERO);
    let yield_frac = reuse_yield.as_fraction();

    let state = engine.state_mut(key);
    let volume_kg = if volume.units.is_population() {
        let charge = super::weighted_initial_charge(state)
            .map(|n| n.value)
            .unwrap_or(Decimal::ZERO);
        volume.value * charge
    } else {
        volume.value
    };
    let reusable = volume_kg * yield_frac;

    state.recovery_specs.push(RecoverySpec {
        stage,
        volume: Num::new(volume_kg, "kg"),
        reuse_yield_pct: yield_frac,
        induction_pct: induction_frac,
    });

    let recycle = state.get(Stream::Recycle).value;
    state.put(Stream::Recycle, Num::new(recycle + reusable, "kg"));

    if stage == RecoveryStage::Recharge {
        let recycle_recharge = state.get(Stream::RecycleRecharge).value;
        state.put(
            Stream::RecycleRecharge,
            Num::new(recycle_recharge + reusable, "kg"),
        );
    }

    // Only the displaced share is pulled back out of virgin sales; the
    // induced share is never written to domestic/import/export at all.
    // `recycle` already carries the full `reusable` amount above, and
    // `recompute` folds `recycle` into the new-equipment pool, so the
    // induced portion reaches new equipment purely through `recycle` —
    // adding it to the virgin streams too would double-count it there.
    let displaced = reusable * (Decimal::ONE - induction_frac);
    let weights = state.distribution.unwrap_or_else(Distribution::all_domestic);

    for stream in [Stream::Domestic, Stream::Import, Stream::Export] {
        let weight = weights.weight_for(stream);
        let net = displaced * weight;
        if net.is_zero() {
            continue;
        }
        let current = state.get(stream).value;
        state.put(stream, Num::new((current - net).max(Decimal::ZERO), "kg"));
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
    fn recharge_stage_recovery_also_credits_recycle_recharge() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);
        engine.set_sales(&k, Stream::Domestic, Num::new(dec!(200), "kg")).unwrap();

        apply_recover(
            &mut engine,
            &k,
            Num::new(dec!(50), "kg"),
            Num::new(dec!(100), "%"),
            RecoveryStage::Recharge,
            None,
        )
        .unwrap();

        let state = engine.store().get(&k).unwrap();
        assert_eq!(state.get(Stream::Recycle).value, dec!(50));
        assert_eq!(state.get(Stream::RecycleRecharge).value, dec!(50));
    }

    #[test]
    fn yield_below_one_reduces_the_reusable_share() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);
        engine.set_sales(&k, Stream::Domestic, Num::new(dec!(200), "kg")).unwrap();

        apply_recover(
            &mut engine,
            &k,
            Num::new(dec!(100), "kg"),
            Num::new(dec!(50), "%"),
            RecoveryStage::Eol,
            None,
        )
        .unwrap();

        let state = engine.store().get(&k).unwrap();
        assert_eq!(state.get(Stream::Recycle).value, dec!(50));
    }

    #[test]
    fn no_induction_pulls_the_full_reusable_share_out_of_domestic_sales() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);
        engine.set_sales(&k, Stream::Domestic, Num::new(dec!(200), "kg")).unwrap();

        apply_recover(
            &mut engine,
            &k,
            Num::new(dec!(50), "kg"),
            Num::new(dec!(100), "%"),
            RecoveryStage::Eol,
            None,
        )
        .unwrap();

        let domestic = engine.store().get(&k).unwrap().get(Stream::Domestic).value;
        assert_eq!(domestic, dec!(150));
    }
}
