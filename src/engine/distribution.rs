//! Distribution capture and implicit recharge (`spec.md` §4.3 rules 2-3).

use rust_decimal::Decimal;

use crate::error::CoreResult;
use crate::num::Num;
use crate::state::{Distribution, SalesStream, Stream, SubstanceState};

/// Weighted-average `kg/unit` across the enabled sales streams, weighted by
/// the frozen distribution when one exists, otherwise an equal-weight
/// average of whatever `initialCharge`s are set. `None` if none are set.
pub fn weighted_initial_charge(state: &SubstanceState) -> Option<Num> {
    let weights = state.distribution.unwrap_or(Distribution::all_domestic());
    let entries: Vec<(Decimal, Decimal)> = [
        (SalesStream::Domestic, weights.pct_domestic),
        (SalesStream::Import, weights.pct_import),
        (SalesStream::Export, weights.pct_export),
    ]
    .into_iter()
    .filter_map(|(s, w)| state.initial_charge.get(&s).map(|n| (n.value, w)))
    .collect();

    if entries.is_empty() {
        return None;
    }

    let weight_sum: Decimal = entries.iter().map(|(_, w)| *w).sum();
    let value = if weight_sum.is_zero() {
        entries.iter().map(|(v, _)| *v).sum::<Decimal>() / Decimal::from(entries.len() as i64)
    } else {
        entries.iter().map(|(v, w)| v * w).sum::<Decimal>() / weight_sum
    };
    Some(Num::new(value, "kg/unit"))
}

/// Freezes `(pctDomestic, pctImport, pctExport)` the first time any sales
/// stream is set within a year (`spec.md` §4.3 rule 2). A no-op once
/// already captured this year.
pub fn ensure_distribution_captured(state: &mut SubstanceState) {
    if state.distribution.is_some() {
        return;
    }

    let dom = state.get(Stream::Domestic).value;
    let imp = state.get(Stream::Import).value;
    let exp = state.get(Stream::Export).value;
    let total = dom + imp + exp;

    state.distribution = Some(if total.is_zero() {
        Distribution::all_domestic()
    } else {
        Distribution {
            pct_domestic: dom / total,
            pct_import: imp / total,
            pct_export: exp / total,
        }
    });
}

/// Adds this year's recharge demand onto the virgin-sales streams,
/// proportionally by the frozen distribution, exactly once per year
/// (`spec.md` §4.3 rule 3). A mass-typed sales write suppresses this for
/// the rest of the year instead of calling it.
pub fn apply_implicit_recharge(state: &mut SubstanceState) -> CoreResult<()> {
    if state.implicit_recharge_applied {
        return Ok(());
    }

    let prior_equipment = state.get(Stream::PriorEquipment).value;
    let recharge_pct = state.recharge_population_pct.unwrap_or(Decimal::ZERO);
    let recharge_vol = state
        .recharge_volume_per_unit
        .as_ref()
        .map(|n| n.value)
        .unwrap_or(Decimal::ZERO);
    let demand = prior_equipment * recharge_pct * recharge_vol;

    if !demand.is_zero() {
        let weights = state.distribution.unwrap_or(Distribution::all_domestic());
        for stream in [Stream::Domestic, Stream::Import, Stream::Export] {
            let share = demand * weights.weight_for(stream);
            if share.is_zero() {
                continue;
            }
            let current = state.get(stream).value;
            state.put(stream, Num::new(current + share, "kg"));
        }
    }

    state.implicit_recharge_applied = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fallback_distribution_is_all_domestic() {
        let mut state = SubstanceState::default();
        ensure_distribution_captured(&mut state);
        let dist = state.distribution.unwrap();
        assert_eq!(dist.pct_domestic, Decimal::ONE);
        assert_eq!(dist.pct_import, Decimal::ZERO);
    }

    #[test]
    fn distribution_reflects_relative_sales() {
        let mut state = SubstanceState::default();
        state.put(Stream::Domestic, Num::new(dec!(75), "kg"));
        state.put(Stream::Import, Num::new(dec!(25), "kg"));
        ensure_distribution_captured(&mut state);
        let dist = state.distribution.unwrap();
        assert_eq!(dist.pct_domestic, dec!(0.75));
        assert_eq!(dist.pct_import, dec!(0.25));
    }

    #[test]
    fn implicit_recharge_runs_once_per_year() {
        let mut state = SubstanceState::default();
        state.put(Stream::PriorEquipment, Num::new(dec!(100), "units"));
        state.recharge_population_pct = Some(dec!(0.1));
        state.recharge_volume_per_unit = Some(Num::new(dec!(2), "kg/unit"));
        state.put(Stream::Domestic, Num::new(dec!(50), "kg"));
        ensure_distribution_captured(&mut state);

        apply_implicit_recharge(&mut state).unwrap();
        assert_eq!(state.get(Stream::Domestic).value, dec!(70));

        apply_implicit_recharge(&mut state).unwrap();
        assert_eq!(state.get(Stream::Domestic).value, dec!(70));
    }
}
