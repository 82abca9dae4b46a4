use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error type for the simulation core.
///
/// Mirrors the error kinds named in the specification one-for-one; each
/// variant wraps a focused sub-error so call sites can match on the concern
/// that actually failed rather than a single flat string.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Invariant(#[from] InvariantError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Errors surfaced unchanged from a DSL front-end.
#[derive(Debug, Clone, Error)]
#[error("parse error at {location}: {message}")]
pub struct ParseError {
    pub location: String,
    pub message: String,
}

impl ParseError {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Errors from the decimal & unit algebra (`spec.md` §4.1).
#[derive(Debug, Clone, Error)]
pub enum UnitError {
    #[error("cannot convert {from} to {to}: {context}")]
    Conversion {
        from: String,
        to: String,
        context: String,
    },

    #[error("'{0}' is not a well-formed unit string")]
    Malformed(String),
}

/// Errors from reading/writing a stream not enabled for a substance.
#[derive(Debug, Clone, Error)]
#[error("stream '{stream}' is not enabled for substance '{substance}'")]
pub struct StreamError {
    pub stream: String,
    pub substance: String,
}

/// Errors from the operation-tree stack machine's arithmetic.
#[derive(Debug, Clone, Error)]
pub enum ArithmeticError {
    #[error("division by zero in {op}")]
    DivideByZero { op: String },

    #[error("non-finite result in {op}: {detail}")]
    NonFinite { op: String, detail: String },

    #[error("{op} exceeded the supported precision: {detail}")]
    Overflow { op: String, detail: String },

    #[error("incompatible units in {op}: {lhs} vs {rhs}")]
    UnitMismatch {
        op: String,
        lhs: String,
        rhs: String,
    },
}

/// Errors from an unresolvable reference to a variable, policy, substance,
/// or application.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind}: '{name}'")]
pub struct NameError {
    pub kind: NameKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum NameKind {
    Variable,
    Policy,
    Substance,
    Application,
    Scenario,
}

/// A material-balance or other internal consistency check failed after a
/// recalculation. Per `spec.md` §7 this should never surface in tests; if it
/// does, it is a bug in the recalculation engine, not a user-input error.
#[derive(Debug, Clone, Error)]
#[error("invariant violation: {detail}")]
pub struct InvariantError {
    pub detail: String,
}

/// Two definitions collide (e.g. two substances of the same name within one
/// application).
#[derive(Debug, Clone, Error)]
#[error("duplicate {kind} '{name}' in {context}")]
pub struct DefinitionError {
    pub kind: String,
    pub name: String,
    pub context: String,
}
