//! The stack machine that executes an [`super::Operation`] tree against a
//! [`crate::engine::RecalculationEngine`] (`spec.md` §4.2 "Execution").
//!
//! `eval_value` handles the expression-shaped operations (arithmetic,
//! stream reads, variables, random draws) and always returns a [`Num`].
//! `execute` handles the statement-shaped "engine ops" (`set`, `cap`,
//! `recharge`, ...), each with exactly one engine call as its side effect,
//! gated by its `During` window.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::{debug_span, warn};

use super::{During, Operation};
use crate::engine::RecalculationEngine;
use crate::error::{CoreError, CoreResult, NameError, NameKind};
use crate::num::{Num, Unit};
use crate::state::{RecoveryStage, SalesStream, Stream, UseKey};

/// Outcome of executing one top-level statement, mainly useful to callers
/// that want to distinguish "ran" from "skipped by During" without treating
/// the latter as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    Applied,
    /// No-op because the current year fell outside the operation's
    /// `During` window (`spec.md` §4.2) — expected control flow, not a
    /// defect.
    SkippedOutsideWindow,
}

fn resolve_stream(name: &str) -> CoreResult<Stream> {
    Stream::from_sugar(name).ok_or_else(|| {
        CoreError::Name(NameError {
            kind: NameKind::Variable,
            name: name.to_string(),
        })
    })
}

fn resolve_sales_stream(name: &str) -> CoreResult<SalesStream> {
    match resolve_stream(name)? {
        Stream::Domestic => Ok(SalesStream::Domestic),
        Stream::Import => Ok(SalesStream::Import),
        Stream::Export => Ok(SalesStream::Export),
        _ => Err(CoreError::Name(NameError {
            kind: NameKind::Variable,
            name: name.to_string(),
        })),
    }
}

fn target_key(key: &UseKey, substance: &Option<String>) -> UseKey {
    match substance {
        Some(name) => UseKey::new(key.application.clone(), name.clone()),
        None => key.clone(),
    }
}

fn truthy(n: &Num) -> bool {
    !n.value.is_zero()
}

fn bool_num(b: bool) -> Num {
    Num::dimensionless(if b {
        rust_decimal::Decimal::ONE
    } else {
        rust_decimal::Decimal::ZERO
    })
}

/// Evaluates an expression-shaped operation to a [`Num`]. Returns
/// [`CoreError::Invariant`] if handed a statement-shaped engine op, which
/// never appears nested inside an expression in a well-formed tree.
pub fn eval_value(engine: &mut RecalculationEngine, key: &UseKey, op: &Operation) -> CoreResult<Num> {
    match op {
        Operation::Add(a, b) => eval_value(engine, key, a)?.checked_add(&eval_value(engine, key, b)?),
        Operation::Sub(a, b) => eval_value(engine, key, a)?.checked_sub(&eval_value(engine, key, b)?),
        Operation::Mul(a, b) => eval_value(engine, key, a)?.checked_mul(&eval_value(engine, key, b)?),
        Operation::Div(a, b) => {
            let lhs = eval_value(engine, key, a)?;
            let rhs = eval_value(engine, key, b)?;
            lhs.checked_div(&rhs, "divide")
        }
        Operation::Pow(a, b) => eval_value(engine, key, a)?.checked_pow(&eval_value(engine, key, b)?),

        Operation::And(a, b) => Ok(bool_num(
            truthy(&eval_value(engine, key, a)?) && truthy(&eval_value(engine, key, b)?),
        )),
        Operation::Or(a, b) => Ok(bool_num(
            truthy(&eval_value(engine, key, a)?) || truthy(&eval_value(engine, key, b)?),
        )),
        Operation::Xor(a, b) => Ok(bool_num(
            truthy(&eval_value(engine, key, a)?) != truthy(&eval_value(engine, key, b)?),
        )),
        Operation::Eq(a, b) => Ok(bool_num(eval_value(engine, key, a)? == eval_value(engine, key, b)?)),
        Operation::Ne(a, b) => Ok(bool_num(eval_value(engine, key, a)? != eval_value(engine, key, b)?)),
        Operation::Lt(a, b) => Ok(bool_num(
            eval_value(engine, key, a)?.value < eval_value(engine, key, b)?.value,
        )),
        Operation::Le(a, b) => Ok(bool_num(
            eval_value(engine, key, a)?.value <= eval_value(engine, key, b)?.value,
        )),
        Operation::Gt(a, b) => Ok(bool_num(
            eval_value(engine, key, a)?.value > eval_value(engine, key, b)?.value,
        )),
        Operation::Ge(a, b) => Ok(bool_num(
            eval_value(engine, key, a)?.value >= eval_value(engine, key, b)?.value,
        )),
        Operation::Conditional(cond, then_op, else_op) => {
            if truthy(&eval_value(engine, key, cond)?) {
                eval_value(engine, key, then_op)
            } else {
                eval_value(engine, key, else_op)
            }
        }

        Operation::PreCalculated(n) => Ok(n.clone()),
        Operation::ChangeUnits(child, unit_str) => {
            let value = eval_value(engine, key, child)?;
            Ok(Num::new(value.value, Unit::new(unit_str.clone())?))
        }
        Operation::RemoveUnits(child) => {
            let value = eval_value(engine, key, child)?;
            Ok(Num::dimensionless(value.value))
        }

        Operation::GetStream {
            name,
            convert_to,
            substance,
        } => {
            let stream = resolve_stream(name)?;
            let read_key = target_key(key, substance);
            let target_unit = convert_to.as_ref().map(|s| Unit::new(s.clone())).transpose()?;
            engine.get_stream(&read_key, stream, target_unit.as_ref())
        }

        Operation::DefineVariable { name, expr } => {
            let value = eval_value(engine, key, expr)?;
            engine.define_variable(key, name, value.clone());
            Ok(value)
        }
        Operation::GetVariable(name) => engine.get_variable(key, name),

        Operation::DrawNormal { mean, std } => {
            let mean = eval_value(engine, key, mean)?;
            let std_dev = eval_value(engine, key, std)?;
            let mean_f64 = mean.value.to_f64().unwrap_or(0.0);
            let std_f64 = std_dev.value.to_f64().unwrap_or(0.0);
            let draw = engine.rng().normal(mean_f64, std_f64);
            Ok(Num::new(decimal_from_f64(draw), mean.units))
        }
        Operation::DrawUniform { low, high } => {
            let low = eval_value(engine, key, low)?;
            let high = eval_value(engine, key, high)?;
            let low_f64 = low.value.to_f64().unwrap_or(0.0);
            let high_f64 = high.value.to_f64().unwrap_or(0.0);
            let draw = engine.rng().uniform(low_f64, high_f64);
            Ok(Num::new(decimal_from_f64(draw), low.units))
        }

        other => Err(crate::error::InvariantError {
            detail: format!("'{other:?}' is a statement, not an expression"),
        }
        .into()),
    }
}

fn decimal_from_f64(v: f64) -> rust_decimal::Decimal {
    rust_decimal::Decimal::from_f64(v).unwrap_or(rust_decimal::Decimal::ZERO)
}

/// Executes one top-level statement. `Conditional` at statement position
/// recurses into whichever branch applies rather than producing a value.
pub fn execute(engine: &mut RecalculationEngine, key: &UseKey, op: &Operation) -> CoreResult<ExecResult> {
    let year = engine.current_year();

    if let Operation::Conditional(cond, then_op, else_op) = op {
        return if truthy(&eval_value(engine, key, cond)?) {
            execute(engine, key, then_op)
        } else {
            execute(engine, key, else_op)
        };
    }

    let during = during_of(op);
    if let Some(during) = during {
        if !during.is_active(engine, key, year)? {
            warn!(substance = %key.substance, year, "operation skipped: outside During window");
            return Ok(ExecResult::SkippedOutsideWindow);
        }
    }

    let _span = debug_span!("execute_operation", substance = %key.substance, year).entered();

    match op {
        Operation::Enable { stream, .. } => {
            engine.enable(key, resolve_sales_stream(stream)?);
        }
        Operation::Equals { expr, .. } => {
            let value = eval_value(engine, key, expr)?;
            engine.set_equals(key, value)?;
        }
        Operation::InitialCharge { stream, expr, .. } => {
            let value = eval_value(engine, key, expr)?;
            engine.set_initial_charge(key, resolve_sales_stream(stream)?, value)?;
        }
        Operation::Set { stream, expr, .. } => {
            let value = eval_value(engine, key, expr)?;
            let stream = resolve_stream(stream)?;
            if stream == Stream::Consumption {
                return Err(crate::error::StreamError {
                    stream: stream.to_string(),
                    substance: key.substance.clone(),
                }
                .into());
            } else if stream == Stream::PriorEquipment {
                crate::engine::retirement::override_prior_equipment(engine, key, value)?;
            } else if stream.is_virgin_sales() || stream == Stream::Sales {
                engine.set_sales(key, stream, value)?;
            } else {
                engine.state_mut(key).put(stream, value);
                engine.recompute(key)?;
            }
        }
        Operation::Change { stream, expr, .. } => {
            let value = eval_value(engine, key, expr)?;
            let stream = resolve_stream(stream)?;
            crate::engine::cap_floor::apply_change(engine, key, stream, value)?;
        }
        Operation::Cap {
            stream,
            expr,
            displace,
            ..
        } => {
            let value = eval_value(engine, key, expr)?;
            let stream = resolve_stream(stream)?;
            crate::engine::cap_floor::apply_cap(engine, key, stream, value, displace.clone())?;
        }
        Operation::Floor {
            stream,
            expr,
            displace,
            ..
        } => {
            let value = eval_value(engine, key, expr)?;
            let stream = resolve_stream(stream)?;
            crate::engine::cap_floor::apply_floor(engine, key, stream, value, displace.clone())?;
        }
        Operation::Recharge {
            pct, vol_per_unit, ..
        } => {
            let pct = eval_value(engine, key, pct)?;
            let vol = eval_value(engine, key, vol_per_unit)?;
            engine.set_recharge(key, pct, vol)?;
        }
        Operation::Recover {
            volume,
            reuse_yield,
            stage,
            induction,
            ..
        } => {
            let volume = eval_value(engine, key, volume)?;
            let reuse_yield = eval_value(engine, key, reuse_yield)?;
            let induction = induction
                .as_ref()
                .map(|expr| eval_value(engine, key, expr))
                .transpose()?;
            let stage = stage.unwrap_or(RecoveryStage::Eol);
            crate::engine::recovery::apply_recover(engine, key, volume, reuse_yield, stage, induction)?;
        }
        Operation::Replace {
            volume,
            stream,
            dest_substance,
            ..
        } => {
            let volume = eval_value(engine, key, volume)?;
            let stream = resolve_stream(stream)?;
            crate::engine::cap_floor::apply_replace(engine, key, stream, volume, dest_substance)?;
        }
        Operation::Retire { amount, .. } => {
            let amount = eval_value(engine, key, amount)?;
            crate::engine::retirement::apply_retire(engine, key, amount)?;
        }
        Operation::RetireWithReplacement { amount, .. } => {
            let amount = eval_value(engine, key, amount)?;
            crate::engine::retirement::apply_retire_with_replacement(engine, key, amount)?;
        }
        _ => {
            return Err(crate::error::InvariantError {
                detail: format!("'{op:?}' is an expression, not a top-level statement"),
            }
            .into());
        }
    }

    Ok(ExecResult::Applied)
}


fn during_of(op: &Operation) -> Option<&During> {
    match op {
        Operation::Enable { during, .. }
        | Operation::Equals { during, .. }
        | Operation::InitialCharge { during, .. }
        | Operation::Set { during, .. }
        | Operation::Change { during, .. }
        | Operation::Cap { during, .. }
        | Operation::Floor { during, .. }
        | Operation::Recharge { during, .. }
        | Operation::Recover { during, .. }
        | Operation::Replace { during, .. }
        | Operation::Retire { during, .. }
        | Operation::RetireWithReplacement { during, .. } => during.as_ref(),
        _ => None,
    }
}
