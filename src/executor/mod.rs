//! Scenario execution (`spec.md` §4.4, §5).
//!
//! For each `(scenario, trial)` the executor builds a fresh
//! [`RecalculationEngine`], applies the `default` policy followed by the
//! scenario's referenced policies in order, advances year by year, and
//! emits one [`EngineResult`] per `(application, substance)` at each
//! year's end. Independent `(scenario, trial)` runs share no mutable
//! state and are fanned out across `rayon`'s global pool, mirroring the
//! teacher's `Environment::evaluate_agents`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::instrument;

use crate::engine::RecalculationEngine;
use crate::error::{CoreError, CoreResult, NameError, NameKind};
use crate::ops::execute;
use crate::program::{DEFAULT_POLICY, Policy, Program, Scenario};
use crate::result::{EngineResult, snapshot};
use crate::state::UseKey;

/// Cooperative stop flag checked between scenarios and between years
/// (`spec.md` §5 Cancellation & timeouts). Cloning shares the same
/// underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Emitted to the progress callback once per completed `(scenario,
/// trial)` (`spec.md` §5).
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub scenario_name: String,
    pub trial_number: u32,
    pub results: usize,
}

/// Runs one or more scenarios from a parsed [`Program`].
pub struct ScenarioExecutor {
    program: Arc<Program>,
    cancellation: CancellationToken,
}

impl ScenarioExecutor {
    pub fn new(program: Program) -> CoreResult<Self> {
        program.validate()?;
        Ok(Self {
            program: Arc::new(program),
            cancellation: CancellationToken::new(),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Runs every scenario named in `scenario_names` (all trials each),
    /// fanned out across `rayon`, with a progress bar for interactive use.
    /// Mirrors the teacher's `evaluate_agents` progress-bar wiring.
    pub fn run_with_progress_bar(&self, scenario_names: &[String]) -> CoreResult<Vec<EngineResult>> {
        let total_trials: u32 = scenario_names
            .iter()
            .map(|name| self.lookup_scenario(name).map(|s| s.trials))
            .collect::<CoreResult<Vec<_>>>()?
            .into_iter()
            .sum();
        let bar = ProgressBar::new(total_trials as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message("Running scenarios...");

        let results = self.run(scenario_names, Some(&|event: ProgressEvent| {
            bar.inc(1);
            bar.set_message(format!("{}#{}", event.scenario_name, event.trial_number));
        }))?;
        bar.finish_with_message("done");
        Ok(results)
    }

    fn lookup_scenario(&self, name: &str) -> CoreResult<&Scenario> {
        self.program.scenario(name).ok_or_else(|| {
            CoreError::Name(NameError {
                kind: NameKind::Scenario,
                name: name.to_string(),
            })
        })
    }

    /// Runs every scenario named in `scenario_names` (all trials each),
    /// collecting results across a `rayon` fan-out. `on_progress` is
    /// invoked once per completed `(scenario, trial)`; no engine instance,
    /// state store, or RNG crosses the parallel boundary (`spec.md` §5).
    pub fn run(
        &self,
        scenario_names: &[String],
        on_progress: Option<&(dyn Fn(ProgressEvent) + Sync)>,
    ) -> CoreResult<Vec<EngineResult>> {
        let mut jobs = Vec::new();
        for name in scenario_names {
            let scenario = self.lookup_scenario(name)?;
            for trial in 0..scenario.trials {
                jobs.push((scenario, trial));
            }
        }

        jobs.par_iter()
            .map(|&(scenario, trial)| {
                if self.cancellation.is_cancelled() {
                    return Ok(Vec::new());
                }
                let results = self.run_one_trial(scenario, trial)?;
                if let Some(cb) = on_progress {
                    cb(ProgressEvent {
                        scenario_name: scenario.name.clone(),
                        trial_number: trial,
                        results: results.len(),
                    });
                }
                Ok(results)
            })
            .try_fold(Vec::new, |mut acc, chunk: CoreResult<Vec<EngineResult>>| {
                acc.extend(chunk?);
                Ok::<_, CoreError>(acc)
            })
            .try_reduce(Vec::new, |mut a, b| {
                a.extend(b);
                Ok(a)
            })
    }

    /// Runs a single `(scenario, trial)` to completion (`spec.md` §4.4).
    #[instrument(skip(self, scenario))]
    fn run_one_trial(&self, scenario: &Scenario, trial: u32) -> CoreResult<Vec<EngineResult>> {
        let mut engine = RecalculationEngine::new(
            scenario.name.clone(),
            trial,
            scenario.start_year,
            scenario.end_year,
        );

        let default_policy = self.program.policy(DEFAULT_POLICY);
        let mut referenced_policies = Vec::new();
        for policy_name in &scenario.policies {
            if policy_name == DEFAULT_POLICY {
                continue;
            }
            let policy = self.program.policy(policy_name).ok_or_else(|| {
                CoreError::Name(NameError {
                    kind: NameKind::Policy,
                    name: policy_name.clone(),
                })
            })?;
            referenced_policies.push(policy);
        }

        let mut results = Vec::new();
        loop {
            if self.cancellation.is_cancelled() {
                break;
            }

            // `spec.md` §4.4 step 4: for each year, execute the operations
            // whose `During` window intersects the current year. `default`
            // runs first, then the scenario's referenced policies in their
            // declared order (`spec.md` §5 Ordering guarantees); operations
            // without a `During` run every year, which is harmless for
            // idempotent writes (`spec.md` §8 property 3).
            if let Some(policy) = default_policy {
                apply_policy(&mut engine, policy)?;
            }
            for policy in &referenced_policies {
                apply_policy(&mut engine, policy)?;
            }

            for key in engine.keys() {
                let snap = snapshot(&mut engine, &key, &scenario.name, trial, engine.current_year())?;
                results.push(snap);
            }

            if !engine.advance_year() {
                break;
            }
        }
        Ok(results)
    }
}

/// Applies every application/substance's operation list for one policy,
/// in textual order (`spec.md` §5 Ordering guarantees). Each operation's
/// own `During` gate (`spec.md` §4.2) decides whether it is a no-op for
/// the engine's current year.
fn apply_policy(engine: &mut RecalculationEngine, policy: &Policy) -> CoreResult<()> {
    for app in &policy.applications {
        for substance in &app.substances {
            let key = UseKey::new(app.name.clone(), substance.name.clone());
            for op in &substance.operations {
                execute(engine, &key, op)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operation;
    use crate::program::{ParsedApplication, ParsedSubstance};

    fn one_substance_program(end_year: i64, trials: u32) -> Program {
        Program {
            policies: vec![Policy {
                name: DEFAULT_POLICY.to_string(),
                applications: vec![ParsedApplication {
                    name: "App".to_string(),
                    substances: vec![ParsedSubstance {
                        name: "Sub".to_string(),
                        operations: vec![
                            Operation::Enable {
                                stream: "domestic".to_string(),
                                during: None,
                            },
                            Operation::Set {
                                stream: "domestic".to_string(),
                                expr: Box::new(Operation::PreCalculated(crate::num::Num::new(
                                    rust_decimal_macros::dec!(10),
                                    "kg",
                                ))),
                                during: None,
                            },
                        ],
                    }],
                }],
            }],
            scenarios: vec![Scenario {
                name: "BAU".to_string(),
                policies: Vec::new(),
                start_year: 1,
                end_year,
                trials,
            }],
        }
    }

    #[test]
    fn cancellation_token_starts_uncancelled_and_can_be_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancellation_token_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn run_emits_one_result_per_year_per_trial() {
        let program = one_substance_program(3, 2);
        let executor = ScenarioExecutor::new(program).unwrap();
        let results = executor.run(&["BAU".to_string()], None).unwrap();
        // 3 years x 2 trials x 1 substance.
        assert_eq!(results.len(), 6);
    }

    #[test]
    fn run_rejects_unknown_scenario_name() {
        let program = one_substance_program(1, 1);
        let executor = ScenarioExecutor::new(program).unwrap();
        let err = executor.run(&["NoSuchScenario".to_string()], None);
        assert!(err.is_err());
    }

    #[test]
    fn cancelling_before_run_yields_no_results() {
        let program = one_substance_program(3, 1);
        let executor = ScenarioExecutor::new(program).unwrap();
        executor.cancellation_token().cancel();
        let results = executor.run(&["BAU".to_string()], None).unwrap();
        assert!(results.is_empty());
    }
}
