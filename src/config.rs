//! Engine-wide constants that are not part of any one substance's state.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

/// Rounding strategy applied at every stream-write and serialization
/// boundary. Classic "round half away from zero", matching the half-up
/// rounding the specification requires be made explicit.
pub const ROUNDING_STRATEGY: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Decimal places retained at serialization boundaries (`EngineResult`
/// fields). Internal stream arithmetic keeps full `Decimal` precision;
/// this only bounds the numbers that leave the engine.
pub const RESULT_SCALE: u32 = 10;

/// Relative epsilon used by the material-balance property check
/// (`spec.md` §8, property 1): `ε = 1e-18 · max(streams)`.
pub fn material_balance_epsilon(max_stream_magnitude: Decimal) -> Decimal {
    let base = Decimal::new(1, 18); // 1e-18
    base * max_stream_magnitude.abs().max(Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_scales_with_magnitude_but_has_a_floor() {
        let small = material_balance_epsilon(Decimal::ZERO);
        let large = material_balance_epsilon(Decimal::from(1_000_000));
        assert!(small > Decimal::ZERO);
        assert!(large > small);
    }

    #[test]
    fn epsilon_is_negative_magnitude_agnostic() {
        assert_eq!(
            material_balance_epsilon(Decimal::from(-50)),
            material_balance_epsilon(Decimal::from(50))
        );
    }
}
