//! Per-`(application, substance)` state (`spec.md` §3).

pub mod stream;

pub use stream::{SalesStream, Stream};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult, NameError, NameKind, StreamError};
use crate::num::Num;
use crate::sorted_vec_map::SortedVecMap;

/// `(application, substance)` — the scope key used throughout the engine.
/// Equality is by literal name, matching `spec.md` §3.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UseKey {
    pub application: String,
    pub substance: String,
}

impl UseKey {
    pub fn new(application: impl Into<String>, substance: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            substance: substance.into(),
        }
    }
}

impl fmt::Display for UseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application, self.substance)
    }
}

/// The frozen `(pctDomestic, pctImport, pctExport)` distribution captured
/// once per (year × substance) the first time sales are set (`spec.md`
/// §3, §4.3 rule 2). Always sums to 1 (§3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub pct_domestic: Decimal,
    pub pct_import: Decimal,
    pub pct_export: Decimal,
}

impl Distribution {
    pub fn all_domestic() -> Self {
        Self {
            pct_domestic: Decimal::ONE,
            pct_import: Decimal::ZERO,
            pct_export: Decimal::ZERO,
        }
    }

    pub fn weight_for(&self, stream: Stream) -> Decimal {
        match stream {
            Stream::Domestic => self.pct_domestic,
            Stream::Import => self.pct_import,
            Stream::Export => self.pct_export,
            _ => Decimal::ZERO,
        }
    }
}

/// One recovery stage (`spec.md` §4.3 rule 7): a volume marked recoverable
/// with a reuse yield and an induction rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySpec {
    pub stage: RecoveryStage,
    pub volume: Num,
    pub reuse_yield_pct: Decimal,
    pub induction_pct: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStage {
    Eol,
    Recharge,
}

/// Cumulative-retirement bookkeeping for the current year (`spec.md` §4.3
/// rule 6). Reset on year advance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetirementState {
    /// Sum of every `retire p%` issued this year (may be negative; §9 Open
    /// Questions).
    pub pct_cumulative: Decimal,
    /// `equipment` snapshotted the instant the first `retire` ran this year.
    pub base: Option<Decimal>,
    /// Units deducted from `equipment` by retirement so far this year.
    pub previously_applied: Decimal,
    /// `previously_applied` at the moment of the most recent manual
    /// `priorEquipment` override, so `equipment` recomputation only nets
    /// out retirement applied *since* that override rather than the
    /// whole year (`spec.md` §4.3 rule 6, §8 S3).
    pub applied_at_last_override: Decimal,
}

/// All state kept for one substance within one application, for the
/// duration of a single (scenario × trial) run (`spec.md` §3 Lifecycles).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstanceState {
    pub streams: SortedVecMap<Stream, Num, 12>,
    pub enabled: SortedVecMap<SalesStream, (), 3>,
    pub ghg_intensity: Option<Num>,
    pub energy_intensity: Option<Num>,
    pub initial_charge: SortedVecMap<SalesStream, Num, 3>,
    /// Fraction (not a `%`-unit `Num`) of prior equipment serviced per year.
    pub recharge_population_pct: Option<Decimal>,
    pub recharge_volume_per_unit: Option<Num>,
    pub retirement: RetirementState,
    pub recovery_specs: Vec<RecoverySpec>,
    pub displacement: SortedVecMap<Stream, String, 4>,
    pub last_specified: SortedVecMap<Stream, Num, 6>,
    pub distribution: Option<Distribution>,
    /// Per-year memo: whether this year's recharge demand has already been
    /// folded into a unit-typed sales write, or suppressed by a mass-typed
    /// one (`spec.md` §4.3 rule 3). Reset on [`SubstanceState::advance_year`].
    pub implicit_recharge_applied: bool,
}

impl Default for SubstanceState {
    fn default() -> Self {
        Self {
            streams: SortedVecMap::new(),
            enabled: SortedVecMap::new(),
            ghg_intensity: None,
            energy_intensity: None,
            initial_charge: SortedVecMap::new(),
            recharge_population_pct: None,
            recharge_volume_per_unit: None,
            retirement: RetirementState::default(),
            recovery_specs: Vec::new(),
            displacement: SortedVecMap::new(),
            last_specified: SortedVecMap::new(),
            distribution: None,
            implicit_recharge_applied: false,
        }
    }
}

impl SubstanceState {
    pub fn is_enabled(&self, stream: Stream) -> bool {
        match SalesStream::from_stream(stream) {
            Some(sales_stream) => self.enabled.contains_key(&sales_stream),
            None => true,
        }
    }

    pub fn get(&self, stream: Stream) -> Num {
        self.streams
            .get(&stream)
            .cloned()
            .unwrap_or_else(|| Num::zero(default_units(stream)))
    }

    /// Raw write, bypassing the enabled-gate check. Used internally by the
    /// recalculation engine once a write has already been validated.
    pub fn put(&mut self, stream: Stream, value: Num) {
        self.streams.insert(stream, value);
    }

    /// Rotates `equipment → priorEquipment`, zeroes flow streams, and
    /// clears the per-year caches (`spec.md` §3 Lifecycles).
    pub fn advance_year(&mut self) {
        let equipment = self.get(Stream::Equipment);
        self.streams.insert(Stream::PriorEquipment, equipment.clone());
        self.streams.insert(Stream::Equipment, equipment);

        for flow in [
            Stream::Domestic,
            Stream::Import,
            Stream::Export,
            Stream::Sales,
            Stream::Recycle,
            Stream::RecycleRecharge,
            Stream::NewEquipment,
            Stream::RechargeEmissions,
            Stream::EolEmissions,
        ] {
            self.streams.insert(flow, Num::zero(default_units(flow)));
        }

        self.distribution = None;
        self.retirement = RetirementState::default();
        self.implicit_recharge_applied = false;
    }
}

pub fn default_units(stream: Stream) -> &'static str {
    match stream {
        Stream::Domestic | Stream::Import | Stream::Export | Stream::Sales | Stream::Recycle
        | Stream::RecycleRecharge | Stream::RechargeEmissions | Stream::EolEmissions => "kg",
        Stream::Equipment | Stream::PriorEquipment | Stream::NewEquipment => "units",
        Stream::Consumption => "tCO2e",
    }
}

/// Per-(scenario, trial) collection of substance state, keyed by
/// `(application, substance)`. Mirrors the teacher's `Ledger`: the
/// authoritative record for one run, owned exclusively by one engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateStore {
    entries: SortedVecMap<UseKey, SubstanceState, 8>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &UseKey) -> CoreResult<&SubstanceState> {
        self.entries.get(key).ok_or_else(|| unknown_substance(key))
    }

    pub fn get_mut(&mut self, key: &UseKey) -> CoreResult<&mut SubstanceState> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| unknown_substance(key))
    }

    pub fn entry_or_default(&mut self, key: &UseKey) -> &mut SubstanceState {
        self.entries.entry(key.clone()).or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &UseKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UseKey, &SubstanceState)> {
        self.entries.iter()
    }

    pub fn advance_year(&mut self) {
        for (_, state) in self.entries.iter_mut() {
            state.advance_year();
        }
    }

    pub fn check_enabled(&self, key: &UseKey, stream: Stream) -> CoreResult<()> {
        let state = self.get(key)?;
        if stream.is_gated_by_enable() && !state.is_enabled(stream) {
            return Err(CoreError::Stream(StreamError {
                stream: stream.to_string(),
                substance: key.substance.clone(),
            }));
        }
        Ok(())
    }
}

fn unknown_substance(key: &UseKey) -> CoreError {
    CoreError::Name(NameError {
        kind: NameKind::Substance,
        name: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_key_displays_as_application_slash_substance() {
        let key = UseKey::new("Domestic Refrigeration", "HFC-134a");
        assert_eq!(key.to_string(), "Domestic Refrigeration/HFC-134a");
    }

    #[test]
    fn get_defaults_to_zero_in_the_stream_default_units() {
        let state = SubstanceState::default();
        let equipment = state.get(Stream::Equipment);
        assert!(equipment.is_zero());
        assert_eq!(equipment.units.to_string(), "units");
    }

    #[test]
    fn advance_year_rotates_equipment_and_zeroes_flows_but_keeps_last_specified() {
        let mut state = SubstanceState::default();
        state.put(Stream::Equipment, Num::new(Decimal::from(42), "units"));
        state.put(Stream::Domestic, Num::new(Decimal::from(100), "kg"));
        state
            .last_specified
            .insert(Stream::Domestic, Num::new(Decimal::from(100), "kg"));
        state.distribution = Some(Distribution::all_domestic());
        state.retirement.previously_applied = Decimal::from(5);
        state.implicit_recharge_applied = true;

        state.advance_year();

        assert_eq!(state.get(Stream::PriorEquipment).value, Decimal::from(42));
        assert_eq!(state.get(Stream::Equipment).value, Decimal::from(42));
        assert!(state.get(Stream::Domestic).is_zero());
        assert!(state.distribution.is_none());
        assert_eq!(state.retirement.previously_applied, Decimal::ZERO);
        assert!(!state.implicit_recharge_applied);
        // last_specified is not reset by advance_year.
        assert!(state.last_specified.get(&Stream::Domestic).is_some());
    }

    #[test]
    fn check_enabled_rejects_gated_streams_until_enabled() {
        let mut store = StateStore::new();
        let key = UseKey::new("App", "Sub");
        store.entry_or_default(&key);

        assert!(store.check_enabled(&key, Stream::Domestic).is_err());

        store
            .get_mut(&key)
            .unwrap()
            .enabled
            .insert(SalesStream::Domestic, ());
        assert!(store.check_enabled(&key, Stream::Domestic).is_ok());

        // Non-gated streams are always fine, enabled or not.
        assert!(store.check_enabled(&key, Stream::Equipment).is_ok());
    }

    #[test]
    fn get_on_unknown_key_is_a_name_error() {
        let store = StateStore::new();
        let key = UseKey::new("Nope", "Nothing");
        let err = store.get(&key).unwrap_err();
        assert!(matches!(err, CoreError::Name(_)));
    }

    #[test]
    fn distribution_weight_for_non_sales_stream_is_zero() {
        let d = Distribution::all_domestic();
        assert_eq!(d.weight_for(Stream::Equipment), Decimal::ZERO);
        assert_eq!(d.weight_for(Stream::Domestic), Decimal::ONE);
    }
}
