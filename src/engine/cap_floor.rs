//! Cap, floor, change, and replace (`spec.md` §4.3 rules 8-10).

use rust_decimal::Decimal;

use super::RecalculationEngine;
use crate::error::{ArithmeticError, CoreResult};
use crate::num::Num;
use crate::state::{Stream, SubstanceState, UseKey};

/// Resolves a cap/floor/change limit that may be given as `%` (relative to
/// `lastSpecified[stream]`) or as an absolute value in the stream's own
/// units.
fn resolve_against_last_specified(state: &SubstanceState, stream: Stream, x: &Num) -> CoreResult<Num> {
    if !x.units.is_percent() {
        return Ok(x.clone());
    }
    let base = state.last_specified.get(&stream).cloned().unwrap_or_else(|| state.get(stream));
    Ok(Num::new(base.value * x.as_fraction(), base.units))
}

fn same_units(a: &Num, b: &Num, op: &str) -> CoreResult<()> {
    if a.units != b.units {
        return Err(ArithmeticError::UnitMismatch {
            op: op.to_string(),
            lhs: a.units.to_string(),
            rhs: b.units.to_string(),
        }
        .into());
    }
    Ok(())
}

fn displace(engine: &mut RecalculationEngine, key: &UseKey, dest_name: &str, stream: Stream, delta: Decimal) -> CoreResult<()> {
    if delta.is_zero() {
        return Ok(());
    }
    let dest = engine.other_state_mut(&key.application, dest_name);
    let current = dest.get(stream);
    dest.put(stream, Num::new((current.value + delta).max(Decimal::ZERO), current.units));
    let dest_key = UseKey::new(key.application.clone(), dest_name);
    engine.recompute(&dest_key)
}

/// `cap <stream> to X [displacing S]`.
pub fn apply_cap(
    engine: &mut RecalculationEngine,
    key: &UseKey,
    stream: Stream,
    limit: Num,
    displace_to: Option<String>,
) -> CoreResult<()> {
    let state = engine.state_mut(key);
    let resolved = resolve_against_last_specified(state, stream, &limit)?;
    let current = state.get(stream);
    same_units(&current, &resolved, "cap")?;
    let new_value = current.value.min(resolved.value);
    let removed = current.value - new_value;
    state.put(stream, Num::new(new_value, current.units.clone()));
    engine.recompute(key)?;

    if let Some(dest) = displace_to {
        displace(engine, key, &dest, stream, removed)?;
    }
    Ok(())
}

/// `floor <stream> to X [displacing S]`.
pub fn apply_floor(
    engine: &mut RecalculationEngine,
    key: &UseKey,
    stream: Stream,
    limit: Num,
    displace_to: Option<String>,
) -> CoreResult<()> {
    let state = engine.state_mut(key);
    let resolved = resolve_against_last_specified(state, stream, &limit)?;
    let current = state.get(stream);
    same_units(&current, &resolved, "floor")?;
    let new_value = current.value.max(resolved.value);
    let added = new_value - current.value;
    state.put(stream, Num::new(new_value, current.units.clone()));
    engine.recompute(key)?;

    if let Some(dest) = displace_to {
        displace(engine, key, &dest, stream, -added)?;
    }
    Ok(())
}

/// `change <stream> by P [during D]`. A `%`-typed `P` resolves against the
/// stream's *current* value, not `lastSpecified` (`spec.md` §4.3 rule 9).
pub fn apply_change(engine: &mut RecalculationEngine, key: &UseKey, stream: Stream, delta: Num) -> CoreResult<()> {
    let state = engine.state_mut(key);
    let current = state.get(stream);
    let added = if delta.units.is_percent() {
        current.value * delta.as_fraction()
    } else {
        same_units(&current, &delta, "change")?;
        delta.value
    };
    let new_value = if stream.is_sales_intent() || stream == Stream::Equipment {
        (current.value + added).max(Decimal::ZERO)
    } else {
        current.value + added
    };

    if stream.is_virgin_sales() {
        return engine.set_sales(key, stream, Num::new(new_value, current.units));
    }
    state.put(stream, Num::new(new_value, current.units));
    engine.recompute(key)
}

/// `replace V of <stream> with "Destination" [during D]`.
pub fn apply_replace(
    engine: &mut RecalculationEngine,
    key: &UseKey,
    stream: Stream,
    volume: Num,
    dest_name: &str,
) -> CoreResult<()> {
    let state = engine.state_mut(key);
    let current = state.get(stream);
    same_units(&current, &volume, "replace")?;
    let moved = volume.value.min(current.value).max(Decimal::ZERO);
    state.put(stream, Num::new(current.value - moved, current.units.clone()));
    engine.recompute(key)?;
    displace(engine, key, dest_name, stream, moved)
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
    fn floor_raises_below_limit_and_leaves_above_limit_untouched() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);
        engine.set_sales(&k, Stream::Domestic, Num::new(dec!(50), "kg")).unwrap();

        apply_floor(&mut engine, &k, Stream::Domestic, Num::new(dec!(100), "kg"), None).unwrap();
        assert_eq!(
            engine.store().get(&k).unwrap().get(Stream::Domestic).value,
            dec!(100)
        );

        apply_floor(&mut engine, &k, Stream::Domestic, Num::new(dec!(20), "kg"), None).unwrap();
        assert_eq!(
            engine.store().get(&k).unwrap().get(Stream::Domestic).value,
            dec!(100)
        );
    }

    #[test]
    fn change_by_percent_resolves_against_current_value_not_last_specified() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);
        engine.set_sales(&k, Stream::Domestic, Num::new(dec!(100), "kg")).unwrap();

        apply_change(&mut engine, &k, Stream::Domestic, Num::new(dec!(10), "%")).unwrap();
        assert_eq!(
            engine.store().get(&k).unwrap().get(Stream::Domestic).value,
            dec!(110)
        );

        apply_change(&mut engine, &k, Stream::Domestic, Num::new(dec!(10), "%")).unwrap();
        assert_eq!(
            engine.store().get(&k).unwrap().get(Stream::Domestic).value,
            dec!(121)
        );
    }

    #[test]
    fn change_by_absolute_mass_is_additive() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let k = key("App", "Sub");
        engine.enable(&k, SalesStream::Domestic);
        engine.set_sales(&k, Stream::Domestic, Num::new(dec!(100), "kg")).unwrap();

        apply_change(&mut engine, &k, Stream::Domestic, Num::new(dec!(-30), "kg")).unwrap();
        assert_eq!(
            engine.store().get(&k).unwrap().get(Stream::Domestic).value,
            dec!(70)
        );
    }

    #[test]
    fn replace_moves_exactly_the_available_volume_when_requested_exceeds_it() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let source = key("App", "Source");
        let dest = key("App", "Dest");
        engine.enable(&source, SalesStream::Domestic);
        engine.enable(&dest, SalesStream::Domestic);
        engine.set_sales(&source, Stream::Domestic, Num::new(dec!(40), "kg")).unwrap();

        apply_replace(&mut engine, &source, Stream::Domestic, Num::new(dec!(100), "kg"), "Dest").unwrap();

        assert_eq!(
            engine.store().get(&source).unwrap().get(Stream::Domestic).value,
            Decimal::ZERO
        );
        assert_eq!(
            engine.store().get(&dest).unwrap().get(Stream::Domestic).value,
            dec!(40)
        );
    }
}
