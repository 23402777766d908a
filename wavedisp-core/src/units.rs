//! Basic unit multipliers.
//!
//! Inputs are given in SI base units. A run may rescale time, length and
//! mass so that the assembled matrices stay well conditioned; one scaled
//! unit of time is `time` seconds, one of length `length` metres and one of
//! mass `mass` kilograms. A quantity with dimensions `Tᵃ Lᵇ Mᶜ` is converted
//! by dividing by `timeᵃ lengthᵇ massᶜ`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Physical quantity kinds that carry units in a run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    One,
    Length,
    WaveNumber,
    Density,
    Stress,
}

impl Quantity {
    /// Exponents of (time, length, mass).
    fn dimensions(self) -> [i32; 3] {
        match self {
            Quantity::One => [0, 0, 0],
            Quantity::Length => [0, 1, 0],
            Quantity::WaveNumber => [0, -1, 0],
            Quantity::Density => [0, -3, 1],
            Quantity::Stress => [-2, -1, 1],
        }
    }
}

/// Sizes of the scaled base units (time, length, mass) in SI units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitMultipliers {
    pub time: f64,
    pub length: f64,
    pub mass: f64,
}

impl Default for UnitMultipliers {
    fn default() -> Self {
        Self {
            time: 1.0,
            length: 1.0,
            mass: 1.0,
        }
    }
}

impl UnitMultipliers {
    pub fn new(time: f64, length: f64, mass: f64) -> Result<Self> {
        let units = Self { time, length, mass };
        units.validate()?;
        Ok(units)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("time", self.time), ("length", self.length), ("mass", self.mass)] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "unit multiplier for {} must be positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Whether every multiplier is 1.
    pub fn is_identity(&self) -> bool {
        self.time == 1.0 && self.length == 1.0 && self.mass == 1.0
    }

    /// Factor converting an SI value of `quantity` to scaled units.
    pub fn factor(&self, quantity: Quantity) -> f64 {
        let [t, l, m] = quantity.dimensions();
        1.0 / (self.time.powi(t) * self.length.powi(l) * self.mass.powi(m))
    }

    /// Convert an SI value of `quantity` to scaled units.
    pub fn apply(&self, value: f64, quantity: Quantity) -> f64 {
        value * self.factor(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_leaves_values() {
        let units = UnitMultipliers::default();
        assert!(units.is_identity());
        for q in [
            Quantity::One,
            Quantity::Length,
            Quantity::WaveNumber,
            Quantity::Density,
            Quantity::Stress,
        ] {
            assert_eq!(units.apply(3.5, q), 3.5);
        }
    }

    #[test]
    fn test_millimetre_scaling() {
        let units = UnitMultipliers::new(1.0, 1e-3, 1.0).unwrap();
        assert_relative_eq!(units.apply(0.02, Quantity::Length), 20.0, max_relative = 1e-12);
        assert_relative_eq!(units.apply(100.0, Quantity::WaveNumber), 0.1, max_relative = 1e-12);
        assert_relative_eq!(units.apply(2.7e3, Quantity::Density), 2.7e-6, max_relative = 1e-12);
        assert_relative_eq!(units.apply(70e9, Quantity::Stress), 70e6, max_relative = 1e-12);
        assert_eq!(units.apply(0.35, Quantity::One), 0.35);
    }

    #[test]
    fn test_wave_speed_is_consistent() {
        // c = √(E/ρ) must scale like length / time.
        let units = UnitMultipliers::new(1e-3, 1e-2, 1e-1).unwrap();
        let (e, rho): (f64, f64) = (70e9, 2.8e3);
        let c_si = (e / rho).sqrt();
        let c_scaled =
            (units.apply(e, Quantity::Stress) / units.apply(rho, Quantity::Density)).sqrt();
        assert_relative_eq!(c_scaled, c_si * units.time / units.length, max_relative = 1e-12);
    }

    #[test]
    fn test_invalid_multipliers() {
        assert!(UnitMultipliers::new(0.0, 1.0, 1.0).is_err());
        assert!(UnitMultipliers::new(1.0, -1.0, 1.0).is_err());
        assert!(UnitMultipliers::new(1.0, 1.0, f64::NAN).is_err());
    }
}
