//! The Recalculation Engine (`spec.md` §4.3) — "the heart". Converts any
//! single user intent into a consistent yearly snapshot, re-deriving every
//! dependent stream from the *last* intents rather than relying on
//! operation ordering.

pub mod cap_floor;
pub mod distribution;
pub mod recovery;
pub mod retirement;

use std::collections::HashSet;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::error::{CoreError, CoreResult, InvariantError, NameError, NameKind};
use crate::num::{ConversionContext, Num, Unit, convert};
use crate::rng::TrialRng;
use crate::sorted_vec_map::SortedVecMap;
use crate::state::{SalesStream, StateStore, Stream, SubstanceState, UseKey};

pub use distribution::weighted_initial_charge;

/// Owns one `(scenario, trial)` run end to end: the state store, the
/// substance-body variable scopes, and the trial's RNG. Single-threaded,
/// never shared across a parallel boundary (`spec.md` §5).
pub struct RecalculationEngine {
    store: StateStore,
    variables: SortedVecMap<UseKey, SortedVecMap<String, Num, 8>, 8>,
    evaluating: HashSet<UseKey>,
    rng: TrialRng,
    start_year: i64,
    end_year: i64,
    current_year: i64,
    scenario_name: String,
    trial_number: u32,
}

impl RecalculationEngine {
    pub fn new(
        scenario_name: impl Into<String>,
        trial_number: u32,
        start_year: i64,
        end_year: i64,
    ) -> Self {
        let scenario_name = scenario_name.into();
        Self {
            store: StateStore::new(),
            variables: SortedVecMap::new(),
            evaluating: HashSet::new(),
            rng: TrialRng::new(&scenario_name, trial_number),
            start_year,
            end_year,
            current_year: start_year,
            scenario_name,
            trial_number,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    pub fn trial_number(&self) -> u32 {
        self.trial_number
    }

    pub fn current_year(&self) -> i64 {
        self.current_year
    }

    pub fn start_year(&self) -> i64 {
        self.start_year
    }

    pub fn end_year(&self) -> i64 {
        self.end_year
    }

    pub fn rng(&mut self) -> &mut TrialRng {
        &mut self.rng
    }

    pub fn keys(&self) -> Vec<UseKey> {
        self.store.keys().cloned().collect()
    }

    /// Rotates `equipment → priorEquipment`, zeroes flow streams, clears
    /// per-year caches; keeps `lastSpecified` (`spec.md` §3 Lifecycles,
    /// §4.4 step 4).
    #[instrument(skip(self))]
    pub fn advance_year(&mut self) -> bool {
        self.store.advance_year();
        self.current_year += 1;
        self.current_year <= self.end_year
    }

    // -- Variable scopes (DefineVariable/GetVariable) -----------------

    pub fn define_variable(&mut self, key: &UseKey, name: &str, value: Num) {
        self.variables
            .entry(key.clone())
            .or_insert_with(SortedVecMap::new)
            .insert(name.to_string(), value);
    }

    pub fn get_variable(&self, key: &UseKey, name: &str) -> CoreResult<Num> {
        self.variables
            .get(key)
            .and_then(|scope| scope.get(name))
            .cloned()
            .ok_or_else(|| {
                CoreError::Name(NameError {
                    kind: NameKind::Variable,
                    name: name.to_string(),
                })
            })
    }

    // -- Stream reads ---------------------------------------------------

    fn conversion_context(&self, state: &SubstanceState) -> ConversionContext {
        ConversionContext {
            volume: None,
            population: Some(state.get(Stream::Equipment)),
            amortized_unit_volume: weighted_initial_charge(state),
            substance_consumption: state.ghg_intensity.clone(),
            energy_intensity: state.energy_intensity.clone(),
        }
    }

    /// Reads `stream` for `key`, optionally converting to `convert_to`.
    /// `consumption` is computed on read rather than stored (`spec.md` §3).
    #[instrument(skip(self))]
    pub fn get_stream(
        &mut self,
        key: &UseKey,
        stream: Stream,
        convert_to: Option<&Unit>,
    ) -> CoreResult<Num> {
        self.store.check_enabled(key, stream)?;
        if !self.evaluating.insert(key.clone()) {
            return Err(InvariantError {
                detail: format!("cyclic substance reference through '{key}'"),
            }
            .into());
        }
        let result = (|| {
            let state = self.store.get(key)?;
            let value = if stream == Stream::Consumption {
                self.compute_consumption(state)?
            } else {
                state.get(stream)
            };
            match convert_to {
                Some(target) => {
                    let ctx = self.conversion_context(self.store.get(key)?);
                    convert(&value, target, &ctx)
                }
                None => Ok(value),
            }
        })();
        self.evaluating.remove(key);
        result
    }

    fn compute_consumption(&self, state: &SubstanceState) -> CoreResult<Num> {
        let Some(intensity) = &state.ghg_intensity else {
            return Ok(Num::zero("tCO2e"));
        };
        let ctx = self.conversion_context(state);
        if intensity.units.is_per_unit() {
            return convert(&state.get(Stream::Equipment), &Unit::literal("tCO2e"), &ctx);
        }
        let mut total = Num::zero("tCO2e");
        for stream in [Stream::Domestic, Stream::Import, Stream::Export, Stream::Recycle] {
            let mass = state.get(stream);
            let tco2e = convert(&mass, &Unit::literal("tCO2e"), &ctx)?;
            total = total.checked_add(&tco2e)?;
        }
        Ok(total)
    }

    // -- Direct writes: Enable / Equals / InitialCharge / Recharge -------

    #[instrument(skip(self))]
    pub fn enable(&mut self, key: &UseKey, sales_stream: SalesStream) {
        self.store.entry_or_default(key).enabled.insert(sales_stream, ());
    }

    #[instrument(skip(self))]
    pub fn set_equals(&mut self, key: &UseKey, value: Num) -> CoreResult<()> {
        let numerator = value.units.numerator();
        let state = self.store.entry_or_default(key);
        if numerator == "kgCO2e" || numerator == "tCO2e" {
            state.ghg_intensity = Some(value);
        } else if numerator == "kwh" {
            state.energy_intensity = Some(value);
        } else {
            return Err(crate::error::UnitError::Conversion {
                from: value.units.to_string(),
                to: "kgCO2e/* | tCO2e/* | kwh/*".to_string(),
                context: "equals expects a GHG or energy intensity".to_string(),
            }
            .into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_initial_charge(
        &mut self,
        key: &UseKey,
        sales_stream: SalesStream,
        value: Num,
    ) -> CoreResult<()> {
        if !value.units.is_per_unit() {
            return Err(crate::error::UnitError::Malformed(value.units.to_string()).into());
        }
        self.store
            .entry_or_default(key)
            .initial_charge
            .insert(sales_stream, value);
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_recharge(&mut self, key: &UseKey, pct: Num, vol_per_unit: Num) -> CoreResult<()> {
        let state = self.store.entry_or_default(key);
        state.recharge_population_pct = Some(pct.as_fraction());
        state.recharge_volume_per_unit = Some(vol_per_unit);
        drop(state);
        self.recompute(key)
    }

    // -- Sales writes: rules 1-5 -----------------------------------------

    /// Writes a virgin-sales stream (`domestic`/`import`/`export`) or the
    /// `sales` aggregate, then re-derives recharge, recharge emissions, and
    /// equipment (`spec.md` §4.3 rules 1-5).
    #[instrument(skip(self, value))]
    pub fn set_sales(&mut self, key: &UseKey, stream: Stream, value: Num) -> CoreResult<()> {
        if stream == Stream::Sales {
            return self.set_sales_aggregate(key, value);
        }
        self.store.check_enabled(key, stream)?;
        let is_population_write = value.units.is_population();

        let state = self.store.entry_or_default(key);
        let mass_value = if is_population_write {
            let initial_charge = SalesStream::from_stream(stream)
                .and_then(|s| state.initial_charge.get(&s).cloned())
                .ok_or_else(|| crate::error::UnitError::Conversion {
                    from: value.units.to_string(),
                    to: "kg".to_string(),
                    context: format!("no initialCharge set for '{stream}'"),
                })?;
            Num::new(value.value * initial_charge.value, "kg")
        } else {
            value.clone()
        };
        state.put(stream, mass_value);
        state.last_specified.insert(stream, value.clone());

        // Rule 1: sales carry-over (domestic/import only; export is not
        // part of the `sales` aggregate).
        if matches!(stream, Stream::Domestic | Stream::Import) {
            let dom = state.last_specified.get(&Stream::Domestic);
            let imp = state.last_specified.get(&Stream::Import);
            let both_unit_typed = |n: &Option<&Num>| n.map(|n| n.units.is_population()).unwrap_or(true);
            if both_unit_typed(&dom) && both_unit_typed(&imp) {
                let mut sum = Num::zero("units");
                if let Some(d) = dom {
                    sum = sum.checked_add(d)?;
                }
                if let Some(i) = imp {
                    sum = sum.checked_add(i)?;
                }
                state.last_specified.insert(Stream::Sales, sum);
            } else {
                state.last_specified.remove(&Stream::Sales);
            }
        }

        distribution::ensure_distribution_captured(state);

        // Rule 3: implicit recharge, only on unit-typed writes.
        if is_population_write && stream.is_virgin_sales() {
            distribution::apply_implicit_recharge(state)?;
        } else if !is_population_write && stream.is_virgin_sales() {
            state.implicit_recharge_applied = true;
        }

        self.recompute(key)
    }

    /// Splits a write to the synthetic `sales` aggregate across the
    /// enabled `domestic`/`import` streams (`spec.md` §3: "`sales`:
    /// Synthetic: domestic + import intent when user specified
    /// aggregate"). Weighted by the frozen distribution when one exists
    /// (defaulting to an even split across whichever of the two streams
    /// are enabled), then delegates to [`Self::set_sales`] per component
    /// so rules 1-5 still apply uniformly.
    fn set_sales_aggregate(&mut self, key: &UseKey, value: Num) -> CoreResult<()> {
        let state = self.store.entry_or_default(key);
        let dom_enabled = state.is_enabled(Stream::Domestic);
        let imp_enabled = state.is_enabled(Stream::Import);
        let (dom_weight, imp_weight) = match state.distribution {
            Some(d) if !(d.pct_domestic + d.pct_import).is_zero() => {
                let total = d.pct_domestic + d.pct_import;
                (d.pct_domestic / total, d.pct_import / total)
            }
            _ => match (dom_enabled, imp_enabled) {
                (true, true) => (Decimal::ONE / Decimal::TWO, Decimal::ONE / Decimal::TWO),
                (true, false) => (Decimal::ONE, Decimal::ZERO),
                (false, true) => (Decimal::ZERO, Decimal::ONE),
                (false, false) => {
                    return Err(CoreError::Stream(crate::error::StreamError {
                        stream: Stream::Sales.to_string(),
                        substance: key.substance.clone(),
                    }));
                }
            },
        };

        let dom_value = Num::new(value.value * dom_weight, value.units.clone());
        let imp_value = Num::new(value.value * imp_weight, value.units.clone());
        if dom_enabled {
            self.set_sales(key, Stream::Domestic, dom_value)?;
        }
        if imp_enabled {
            self.set_sales(key, Stream::Import, imp_value)?;
        }
        Ok(())
    }

    /// Re-derives `rechargeEmissions`, `newEquipment`, and `equipment` from
    /// the current sales/recharge/retirement state (rules 4-5). Idempotent:
    /// calling it twice without new writes reproduces the same snapshot
    /// (`spec.md` §8 property 3).
    #[instrument(skip(self))]
    pub(crate) fn recompute(&mut self, key: &UseKey) -> CoreResult<()> {
        let state = self.store.entry_or_default(key);

        let prior_equipment = state.get(Stream::PriorEquipment).value;
        let recharge_pct = state.recharge_population_pct.unwrap_or(Decimal::ZERO);
        let recharge_vol = state
            .recharge_volume_per_unit
            .as_ref()
            .map(|n| n.value)
            .unwrap_or(Decimal::ZERO);
        let raw_recharge_demand_kg = prior_equipment * recharge_pct * recharge_vol;

        let recycle_recharge_kg = state.get(Stream::RecycleRecharge).value;
        let reported_recharge = (raw_recharge_demand_kg - recycle_recharge_kg).max(Decimal::ZERO);
        state.put(Stream::RechargeEmissions, Num::new(reported_recharge, "kg"));

        let domestic = state.get(Stream::Domestic).value;
        let import = state.get(Stream::Import).value;
        let recycle = state.get(Stream::Recycle).value;
        let weighted_charge = weighted_initial_charge(state)
            .map(|n| n.value)
            .filter(|v| !v.is_zero());

        let new_equipment_units = match weighted_charge {
            Some(charge) => {
                ((domestic + import + recycle - raw_recharge_demand_kg) / charge).max(Decimal::ZERO)
            }
            None => Decimal::ZERO,
        };
        state.put(Stream::NewEquipment, Num::new(new_equipment_units, "units"));

        // Retirement applied since the most recent manual `priorEquipment`
        // override (or since the start of the year, if none happened) —
        // a prior override already folds everything applied up to that
        // point into the new `priorEquipment`/`equipment` values directly
        // (`spec.md` §4.3 rule 6, §8 S3).
        let retired_since_baseline =
            state.retirement.previously_applied - state.retirement.applied_at_last_override;
        let equipment = (prior_equipment + new_equipment_units - retired_since_baseline).max(Decimal::ZERO);
        state.put(Stream::Equipment, Num::new(equipment, "units"));

        Ok(())
    }

    pub(crate) fn state_mut(&mut self, key: &UseKey) -> &mut SubstanceState {
        self.store.entry_or_default(key)
    }

    pub(crate) fn other_state_mut(&mut self, application: &str, substance: &str) -> &mut SubstanceState {
        self.store
            .entry_or_default(&UseKey::new(application, substance))
    }

    /// Material-balance check (`spec.md` §8 property 1). Exposed for tests
    /// and for an invariant check a caller may run after a full year.
    pub fn check_material_balance(&self, key: &UseKey) -> CoreResult<()> {
        let state = self.store.get(key)?;
        let prior = state.get(Stream::PriorEquipment).value;
        let new = state.get(Stream::NewEquipment).value;
        let retired = state.retirement.previously_applied - state.retirement.applied_at_last_override;
        let equipment = state.get(Stream::Equipment).value;

        let max_magnitude = [prior, new, retired, equipment]
            .into_iter()
            .map(|v| v.abs())
            .fold(Decimal::ZERO, Decimal::max);
        let epsilon = crate::config::material_balance_epsilon(max_magnitude);

        if (prior + new - retired - equipment).abs() > epsilon {
            return Err(InvariantError {
                detail: format!(
                    "material balance violated for '{key}': priorEquipment={prior} newEquipment={new} retired={retired} equipment={equipment}"
                ),
            }
            .into());
        }
        Ok(())
    }
}
