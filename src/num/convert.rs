//! `Convert(n, target, ctx)` — `spec.md` §4.1.

use rust_decimal::Decimal;

use super::{Num, Unit};
use crate::error::{CoreResult, UnitError};

/// Per-substance context supplying the ratios needed to resolve a
/// conversion. Every field is optional: a conversion that doesn't need a
/// given ratio doesn't require it to be populated.
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    /// The current mass being converted, when relevant to the conversion
    /// (e.g. resolving a `%` against a prior absolute value).
    pub volume: Option<Num>,
    /// Installed population, in `units`.
    pub population: Option<Num>,
    /// `kg/unit` (or `mt/unit`) — the mass embedded per installed unit.
    pub amortized_unit_volume: Option<Num>,
    /// The substance's GHG intensity, e.g. `kgCO2e/kg`, `tCO2e/kg`,
    /// `kgCO2e/unit`, `kgCO2e/mt`.
    pub substance_consumption: Option<Num>,
    /// `kwh/unit`.
    pub energy_intensity: Option<Num>,
}

const KG_PER_MT: i64 = 1000;

fn mass_to_kg(n: &Num) -> CoreResult<Decimal> {
    match n.units.as_str() {
        "kg" => Ok(n.value),
        "mt" => Ok(n.value * Decimal::from(KG_PER_MT)),
        other => Err(UnitError::Conversion {
            from: other.to_string(),
            to: "kg".to_string(),
            context: "expected a mass unit".to_string(),
        }
        .into()),
    }
}

fn kg_to_mass(value_kg: Decimal, target: &str) -> CoreResult<Decimal> {
    match target {
        "kg" => Ok(value_kg),
        "mt" => Ok(value_kg / Decimal::from(KG_PER_MT)),
        other => Err(UnitError::Conversion {
            from: "kg".to_string(),
            to: other.to_string(),
            context: "expected a mass unit".to_string(),
        }
        .into()),
    }
}

/// Converts `kg` of substance into tCO2e using a `kgCO2e/kg` or `tCO2e/kg`
/// intensity.
fn mass_kg_to_tco2e(mass_kg: Decimal, intensity: &Num) -> CoreResult<Decimal> {
    match intensity.units.numerator() {
        "kgCO2e" => Ok(mass_kg * intensity.value / Decimal::from(KG_PER_MT)),
        "tCO2e" => Ok(mass_kg * intensity.value),
        other => Err(UnitError::Conversion {
            from: mass_kg.to_string(),
            to: "tCO2e".to_string(),
            context: format!("unsupported GHG intensity numerator '{other}'"),
        }
        .into()),
    }
}

/// Converts a population count (in `units`) into tCO2e using a per-unit
/// intensity — the "equipment-based emissions" branch.
fn population_to_tco2e(count: Decimal, intensity: &Num) -> CoreResult<Decimal> {
    match intensity.units.numerator() {
        "kgCO2e" => Ok(count * intensity.value / Decimal::from(KG_PER_MT)),
        "tCO2e" => Ok(count * intensity.value),
        other => Err(UnitError::Conversion {
            from: count.to_string(),
            to: "tCO2e".to_string(),
            context: format!("unsupported GHG intensity numerator '{other}'"),
        }
        .into()),
    }
}

/// Converts `n` into `target` units, failing with `UnitConversion` if the
/// context does not supply what's needed.
pub fn convert(n: &Num, target: &Unit, ctx: &ConversionContext) -> CoreResult<Num> {
    if &n.units == target {
        return Ok(n.clone());
    }

    let from = n.units.as_str();
    let to = target.as_str();

    // Mass <-> mass.
    if n.units.is_mass() && target.is_mass() {
        let kg = mass_to_kg(n)?;
        return Ok(Num::new(kg_to_mass(kg, to)?, target.clone()));
    }

    // units -> kg/mt, via amortized unit volume.
    if n.units.is_population() && target.is_mass() {
        let per_unit = ctx.amortized_unit_volume.as_ref().ok_or_else(|| {
            UnitError::Conversion {
                from: from.to_string(),
                to: to.to_string(),
                context: "missing amortized unit volume".to_string(),
            }
        })?;
        let kg = n.value * mass_to_kg(per_unit)?;
        return Ok(Num::new(kg_to_mass(kg, to)?, target.clone()));
    }

    // kg/mt -> units, via amortized unit volume.
    if n.units.is_mass() && target.is_population() {
        let per_unit = ctx.amortized_unit_volume.as_ref().ok_or_else(|| {
            UnitError::Conversion {
                from: from.to_string(),
                to: to.to_string(),
                context: "missing amortized unit volume".to_string(),
            }
        })?;
        let per_unit_kg = mass_to_kg(per_unit)?;
        if per_unit_kg.is_zero() {
            return Err(UnitError::Conversion {
                from: from.to_string(),
                to: to.to_string(),
                context: "amortized unit volume is zero".to_string(),
            }
            .into());
        }
        let kg = mass_to_kg(n)?;
        return Ok(Num::new(kg / per_unit_kg, target.clone()));
    }

    // kg/mt -> tCO2e, via substance GHG intensity (mass-denominated).
    if n.units.is_mass() && to == "tCO2e" {
        let intensity = ctx.substance_consumption.as_ref().ok_or_else(|| {
            UnitError::Conversion {
                from: from.to_string(),
                to: to.to_string(),
                context: "missing GHG intensity".to_string(),
            }
        })?;
        let kg = mass_to_kg(n)?;
        return Ok(Num::new(mass_kg_to_tco2e(kg, intensity)?, target.clone()));
    }

    // units -> tCO2e, via per-unit GHG intensity (equipment-based branch).
    if n.units.is_population() && to == "tCO2e" {
        let intensity = ctx.substance_consumption.as_ref().ok_or_else(|| {
            UnitError::Conversion {
                from: from.to_string(),
                to: to.to_string(),
                context: "missing GHG intensity".to_string(),
            }
        })?;
        if !intensity.units.is_per_unit() {
            return Err(UnitError::Conversion {
                from: from.to_string(),
                to: to.to_string(),
                context: "GHG intensity is not per-unit".to_string(),
            }
            .into());
        }
        return Ok(Num::new(
            population_to_tco2e(n.value, intensity)?,
            target.clone(),
        ));
    }

    // units -> kwh, via energy intensity.
    if n.units.is_population() && to == "kwh" {
        let intensity = ctx.energy_intensity.as_ref().ok_or_else(|| UnitError::Conversion {
            from: from.to_string(),
            to: to.to_string(),
            context: "missing energy intensity".to_string(),
        })?;
        return Ok(Num::new(n.value * intensity.value, target.clone()));
    }

    Err(UnitError::Conversion {
        from: from.to_string(),
        to: to.to_string(),
        context: "no applicable conversion rule".to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mass_round_trip() {
        let ctx = ConversionContext::default();
        let kg = Num::new(dec!(2500), Unit::literal("kg"));
        let mt = convert(&kg, &Unit::literal("mt"), &ctx).unwrap();
        assert_eq!(mt.value, dec!(2.5));
        let back = convert(&mt, &Unit::literal("kg"), &ctx).unwrap();
        assert_eq!(back.value, dec!(2500));
    }

    #[test]
    fn units_to_kg_via_initial_charge() {
        let ctx = ConversionContext {
            amortized_unit_volume: Some(Num::new(dec!(10), Unit::literal("kg/unit"))),
            ..Default::default()
        };
        let units = Num::new(dec!(5), Unit::literal("units"));
        let kg = convert(&units, &Unit::literal("kg"), &ctx).unwrap();
        assert_eq!(kg.value, dec!(50));
    }

    #[test]
    fn kg_to_tco2e_via_ghg_intensity() {
        let ctx = ConversionContext {
            substance_consumption: Some(Num::new(dec!(1430), Unit::literal("kgCO2e/kg"))),
            ..Default::default()
        };
        let kg = Num::new(dec!(1000), Unit::literal("kg"));
        let tco2e = convert(&kg, &Unit::literal("tCO2e"), &ctx).unwrap();
        assert_eq!(tco2e.value, dec!(1430));
    }

    #[test]
    fn missing_context_is_unit_conversion_error() {
        let ctx = ConversionContext::default();
        let units = Num::new(dec!(5), Unit::literal("units"));
        let err = convert(&units, &Unit::literal("kg"), &ctx);
        assert!(err.is_err());
    }
}
