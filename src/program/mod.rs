//! The `ParsedProgram` contract (`spec.md` §6): the only required
//! interface between a DSL front-end and this core. "Any parser producing
//! this structure works."

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CoreResult, DefinitionError};
use crate::ops::Operation;

/// The reserved policy name establishing the baseline every scenario
/// builds on (`spec.md` §3 Program-level entities).
pub const DEFAULT_POLICY: &str = "default";

/// `Program { policies: [Policy], scenarios: [Scenario] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub policies: Vec<Policy>,
    pub scenarios: Vec<Scenario>,
}

impl Program {
    pub fn policy(&self, name: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.name == name)
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Rejects two substances sharing a name within one application
    /// (`spec.md` §9 Design Notes: "Two substances with same name ... in
    /// one application must be rejected as `DuplicateDefinition`").
    pub fn validate(&self) -> CoreResult<()> {
        for policy in &self.policies {
            for app in &policy.applications {
                let mut seen = HashSet::new();
                for substance in &app.substances {
                    if !seen.insert(substance.name.as_str()) {
                        return Err(DefinitionError {
                            kind: "substance".to_string(),
                            name: substance.name.clone(),
                            context: format!("application '{}' in policy '{}'", app.name, policy.name),
                        }
                        .into());
                    }
                }
            }
        }
        Ok(())
    }
}

/// `Policy { name: String, applications: [ParsedApplication] }`. The
/// special policy `"default"` establishes the base world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub applications: Vec<ParsedApplication>,
}

/// `ParsedApplication { name: String, substances: [ParsedSubstance] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedApplication {
    pub name: String,
    pub substances: Vec<ParsedSubstance>,
}

/// `ParsedSubstance { name: String, operations: [Operation] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSubstance {
    pub name: String,
    pub operations: Vec<Operation>,
}

/// `Scenario { name: String, policies: [String], startYear: Int, endYear:
/// Int, trials: Int }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub policies: Vec<String>,
    pub start_year: i64,
    pub end_year: i64,
    pub trials: u32,
}

impl Scenario {
    pub fn years(&self) -> std::ops::RangeInclusive<i64> {
        self.start_year..=self.end_year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substance(name: &str) -> ParsedSubstance {
        ParsedSubstance {
            name: name.to_string(),
            operations: Vec::new(),
        }
    }

    #[test]
    fn policy_and_scenario_lookup_by_name() {
        let program = Program {
            policies: vec![Policy {
                name: "default".to_string(),
                applications: Vec::new(),
            }],
            scenarios: vec![Scenario {
                name: "BAU".to_string(),
                policies: Vec::new(),
                start_year: 1,
                end_year: 5,
                trials: 1,
            }],
        };
        assert!(program.policy("default").is_some());
        assert!(program.policy("missing").is_none());
        assert!(program.scenario("BAU").is_some());
        assert!(program.scenario("missing").is_none());
    }

    #[test]
    fn validate_accepts_distinct_substance_names_across_applications() {
        let program = Program {
            policies: vec![Policy {
                name: DEFAULT_POLICY.to_string(),
                applications: vec![
                    ParsedApplication {
                        name: "App A".to_string(),
                        substances: vec![substance("X")],
                    },
                    ParsedApplication {
                        name: "App B".to_string(),
                        substances: vec![substance("X")],
                    },
                ],
            }],
            scenarios: Vec::new(),
        };
        assert!(program.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_substance_within_one_application() {
        let program = Program {
            policies: vec![Policy {
                name: DEFAULT_POLICY.to_string(),
                applications: vec![ParsedApplication {
                    name: "App A".to_string(),
                    substances: vec![substance("X"), substance("X")],
                }],
            }],
            scenarios: Vec::new(),
        };
        assert!(program.validate().is_err());
    }

    #[test]
    fn scenario_years_is_inclusive() {
        let scenario = Scenario {
            name: "s".to_string(),
            policies: Vec::new(),
            start_year: 2,
            end_year: 4,
            trials: 1,
        };
        assert_eq!(scenario.years().collect::<Vec<_>>(), vec![2, 3, 4]);
    }
}
