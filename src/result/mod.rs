//! Per-year result serialization (`spec.md` §6 `EngineResult`).
//!
//! One [`EngineResult`] is emitted per `(application, substance, year,
//! scenario, trial)`. Every field is unit-converted here; the serializer,
//! not the caller, is responsible for resolving ratios from per-substance
//! state and for the "per-unit emissions factor" branch (`spec.md` §4.1)
//! that switches reporting into equipment-based emissions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::RecalculationEngine;
use crate::error::CoreResult;
use crate::num::{ConversionContext, Num, Unit, convert};
use crate::state::{Stream, SubstanceState, UseKey};

/// Import/export-specific detail broken out of the main snapshot
/// (`spec.md` §6 `tradeSupplement`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSupplement {
    pub import_value: Decimal,
    pub import_consumption: Decimal,
    pub import_population: Decimal,
    pub export_value: Decimal,
    pub export_consumption: Decimal,
}

/// One `(application, substance)` snapshot for one year of one
/// `(scenario, trial)` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    pub scenario_name: String,
    pub trial_number: u32,
    pub year: i64,
    pub application: String,
    pub substance: String,

    /// kg.
    pub domestic: Decimal,
    pub import: Decimal,
    pub export: Decimal,
    /// kg.
    pub recycle: Decimal,

    /// units.
    pub population: Decimal,
    pub population_new: Decimal,

    /// kwh.
    pub energy_consumption: Decimal,

    /// tCO2e.
    pub domestic_consumption: Decimal,
    pub import_consumption: Decimal,
    pub export_consumption: Decimal,
    pub recycle_consumption: Decimal,

    /// tCO2e.
    pub recharge_emissions: Decimal,
    pub eol_emissions: Decimal,
    pub initial_charge_emissions: Decimal,
    pub consumption: Decimal,

    pub trade_supplement: TradeSupplement,
}

fn context_for(state: &SubstanceState) -> ConversionContext {
    ConversionContext {
        volume: None,
        population: Some(state.get(Stream::Equipment)),
        amortized_unit_volume: crate::engine::weighted_initial_charge(state),
        substance_consumption: state.ghg_intensity.clone(),
        energy_intensity: state.energy_intensity.clone(),
    }
}

/// `kg -> tCO2e` for one stream, or zero if no GHG intensity is set.
fn mass_stream_to_tco2e(state: &SubstanceState, stream: Stream, ctx: &ConversionContext) -> CoreResult<Decimal> {
    let Some(intensity) = &state.ghg_intensity else {
        return Ok(Decimal::ZERO);
    };
    if intensity.units.is_per_unit() {
        // Equipment-based emissions branch: mass streams don't individually
        // carry emissions; everything is attributed to installed population.
        return Ok(Decimal::ZERO);
    }
    let mass = state.get(stream);
    let tco2e = convert(&mass, &Unit::literal("tCO2e"), ctx)?;
    Ok(tco2e.value)
}

/// Snapshots one `(application, substance)` for the engine's current year.
/// Called once per key at year-end by the scenario executor (`spec.md`
/// §4.4 step 4).
pub fn snapshot(
    engine: &mut RecalculationEngine,
    key: &UseKey,
    scenario_name: &str,
    trial_number: u32,
    year: i64,
) -> CoreResult<EngineResult> {
    let state = engine.store().get(key)?.clone();
    let ctx = context_for(&state);

    let domestic = state.get(Stream::Domestic).value;
    let import = state.get(Stream::Import).value;
    let export = state.get(Stream::Export).value;
    let recycle = state.get(Stream::Recycle).value;
    let population = state.get(Stream::Equipment).value;
    let population_new = state.get(Stream::NewEquipment).value;

    let energy_consumption = match &state.energy_intensity {
        Some(_) => convert(&state.get(Stream::Equipment), &Unit::literal("kwh"), &ctx)?.value,
        None => Decimal::ZERO,
    };

    let domestic_consumption = mass_stream_to_tco2e(&state, Stream::Domestic, &ctx)?;
    let import_consumption = mass_stream_to_tco2e(&state, Stream::Import, &ctx)?;
    // Per `spec.md` §9 Open Questions: in the equipment-based (per-unit
    // GHG intensity) branch, export-attributed emissions are reported as
    // zero rather than derived from the equipment total a second time.
    let export_consumption = mass_stream_to_tco2e(&state, Stream::Export, &ctx)?;
    let recycle_consumption = mass_stream_to_tco2e(&state, Stream::Recycle, &ctx)?;

    let consumption = engine.get_stream(key, Stream::Consumption, None)?.value;

    let recharge_emissions = state.get(Stream::RechargeEmissions);
    let recharge_emissions_tco2e = if state.ghg_intensity.is_some() {
        convert(&recharge_emissions, &Unit::literal("tCO2e"), &ctx)?.value
    } else {
        Decimal::ZERO
    };

    let eol_emissions = state.get(Stream::EolEmissions);
    let eol_emissions_tco2e = if state.ghg_intensity.is_some() {
        convert(&eol_emissions, &Unit::literal("tCO2e"), &ctx)?.value
    } else {
        Decimal::ZERO
    };

    let initial_charge_emissions = initial_charge_emissions_tco2e(&state, &ctx)?;

    let trade_supplement = TradeSupplement {
        import_value: import,
        import_consumption,
        import_population: population_allocated(&state, Stream::Import),
        export_value: export,
        export_consumption: if state
            .ghg_intensity
            .as_ref()
            .map(|n| n.units.is_per_unit())
            .unwrap_or(false)
        {
            Decimal::ZERO
        } else {
            export_consumption
        },
    };

    Ok(EngineResult {
        scenario_name: scenario_name.to_string(),
        trial_number,
        year,
        application: key.application.clone(),
        substance: key.substance.clone(),
        domestic,
        import,
        export,
        recycle,
        population,
        population_new,
        energy_consumption,
        domestic_consumption,
        import_consumption,
        export_consumption,
        recycle_consumption,
        recharge_emissions: recharge_emissions_tco2e,
        eol_emissions: eol_emissions_tco2e,
        initial_charge_emissions,
        consumption,
        trade_supplement,
    })
}

/// tCO2e embedded in this year's `newEquipment` at installation, via the
/// weighted initial charge (mass-denominated GHG intensity only — the
/// per-unit branch already counts the whole installed population).
fn initial_charge_emissions_tco2e(state: &SubstanceState, ctx: &ConversionContext) -> CoreResult<Decimal> {
    let Some(intensity) = &state.ghg_intensity else {
        return Ok(Decimal::ZERO);
    };
    if intensity.units.is_per_unit() {
        return Ok(Decimal::ZERO);
    }
    let Some(charge) = crate::engine::weighted_initial_charge(state) else {
        return Ok(Decimal::ZERO);
    };
    let new_equipment = state.get(Stream::NewEquipment).value;
    let mass = Num::new(new_equipment * charge.value, "kg");
    Ok(convert(&mass, &Unit::literal("tCO2e"), ctx)?.value)
}

/// Share of installed population attributable to one sales stream, by the
/// frozen distribution.
fn population_allocated(state: &SubstanceState, stream: Stream) -> Decimal {
    let weight = state
        .distribution
        .map(|d| d.weight_for(stream))
        .unwrap_or(Decimal::ZERO);
    state.get(Stream::Equipment).value * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SalesStream, UseKey};
    use rust_decimal_macros::dec;

    #[test]
    fn mass_denominated_ghg_intensity_reports_per_stream_emissions() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let key = UseKey::new("App", "Sub");
        engine.enable(&key, SalesStream::Domestic);
        engine.set_equals(&key, Num::new(dec!(1430), "kgCO2e/kg")).unwrap();
        engine.set_sales(&key, Stream::Domestic, Num::new(dec!(100), "kg")).unwrap();

        let snap = snapshot(&mut engine, &key, "s", 0, 1).unwrap();
        assert_eq!(snap.domestic_consumption, dec!(143));
        assert_eq!(snap.trade_supplement.export_consumption, Decimal::ZERO);
    }

    #[test]
    fn per_unit_ghg_intensity_zeroes_stream_level_emissions() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let key = UseKey::new("App", "Sub");
        engine.enable(&key, SalesStream::Domestic);
        engine
            .set_initial_charge(&key, SalesStream::Domestic, Num::new(dec!(1), "kg/unit"))
            .unwrap();
        engine.set_equals(&key, Num::new(dec!(500), "tCO2e/unit")).unwrap();
        engine.set_sales(&key, Stream::Domestic, Num::new(dec!(10), "units")).unwrap();

        let snap = snapshot(&mut engine, &key, "s", 0, 1).unwrap();
        // Per-unit branch: mass-stream emissions are zero; everything is
        // attributed to equipment instead.
        assert_eq!(snap.domestic_consumption, Decimal::ZERO);
        assert_eq!(snap.consumption, dec!(5000));
    }

    #[test]
    fn no_ghg_intensity_reports_zero_consumption_everywhere() {
        let mut engine = RecalculationEngine::new("s", 0, 1, 1);
        let key = UseKey::new("App", "Sub");
        engine.enable(&key, SalesStream::Domestic);
        engine.set_sales(&key, Stream::Domestic, Num::new(dec!(100), "kg")).unwrap();

        let snap = snapshot(&mut engine, &key, "s", 0, 1).unwrap();
        assert_eq!(snap.domestic_consumption, Decimal::ZERO);
        assert_eq!(snap.consumption, Decimal::ZERO);
    }
}
