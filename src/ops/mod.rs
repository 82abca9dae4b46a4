//! Operation Tree & Stack Machine (`spec.md` §4.2).
//!
//! [`Operation`] is the single tagged variant the teacher's `dfa::States`
//! typestate lineage is replaced with (`spec.md` §9 Design Notes: "Replace
//! with a tagged variant: a single Operation enum/sum, one exhaustive
//! dispatch per operation kind").

pub mod during;
pub mod stack;

pub use during::{During, DuringBound};
pub use stack::{ExecResult, eval_value, execute};

use serde::{Deserialize, Serialize};

use crate::num::Num;
use crate::state::RecoveryStage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    // Arithmetic.
    Add(Box<Operation>, Box<Operation>),
    Sub(Box<Operation>, Box<Operation>),
    Mul(Box<Operation>, Box<Operation>),
    Div(Box<Operation>, Box<Operation>),
    Pow(Box<Operation>, Box<Operation>),

    // Logical/relational.
    And(Box<Operation>, Box<Operation>),
    Or(Box<Operation>, Box<Operation>),
    Xor(Box<Operation>, Box<Operation>),
    Eq(Box<Operation>, Box<Operation>),
    Ne(Box<Operation>, Box<Operation>),
    Lt(Box<Operation>, Box<Operation>),
    Le(Box<Operation>, Box<Operation>),
    Gt(Box<Operation>, Box<Operation>),
    Ge(Box<Operation>, Box<Operation>),
    Conditional(Box<Operation>, Box<Operation>, Box<Operation>),

    // Value.
    PreCalculated(Num),
    ChangeUnits(Box<Operation>, String),
    RemoveUnits(Box<Operation>),

    // Stream read.
    GetStream {
        name: String,
        convert_to: Option<String>,
        substance: Option<String>,
    },

    // Variables, scoped to the substance body, surviving across years.
    DefineVariable {
        name: String,
        expr: Box<Operation>,
    },
    GetVariable(String),

    // Random draws, seeded per trial.
    DrawNormal {
        mean: Box<Operation>,
        std: Box<Operation>,
    },
    DrawUniform {
        low: Box<Operation>,
        high: Box<Operation>,
    },

    // Engine ops — each is a statement with one engine call as its effect.
    Enable {
        stream: String,
        during: Option<During>,
    },
    Equals {
        expr: Box<Operation>,
        during: Option<During>,
    },
    InitialCharge {
        stream: String,
        expr: Box<Operation>,
        during: Option<During>,
    },
    Set {
        stream: String,
        expr: Box<Operation>,
        during: Option<During>,
    },
    Change {
        stream: String,
        expr: Box<Operation>,
        during: Option<During>,
    },
    Cap {
        stream: String,
        expr: Box<Operation>,
        displace: Option<String>,
        during: Option<During>,
    },
    Floor {
        stream: String,
        expr: Box<Operation>,
        displace: Option<String>,
        during: Option<During>,
    },
    Recharge {
        pct: Box<Operation>,
        vol_per_unit: Box<Operation>,
        during: Option<During>,
    },
    Recover {
        volume: Box<Operation>,
        reuse_yield: Box<Operation>,
        stage: Option<RecoveryStage>,
        induction: Option<Box<Operation>>,
        during: Option<During>,
    },
    Replace {
        volume: Box<Operation>,
        stream: String,
        dest_substance: String,
        during: Option<During>,
    },
    Retire {
        amount: Box<Operation>,
        during: Option<During>,
    },
    RetireWithReplacement {
        amount: Box<Operation>,
        during: Option<During>,
    },
}
