//! Material phases of the periodic cell.
//!
//! The system matrices arrive precomputed, so materials only matter for the
//! reference waves: the dispersion branches of a homogeneous medium with the
//! averaged Lamé parameters and density, `ω_p = κ c_p` and `ω_s = κ c_s`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::units::{Quantity, UnitMultipliers};

/// Isotropic linear elastic material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Young's modulus (Pa).
    pub youngs_modulus: f64,
    /// Poisson's ratio (dimensionless).
    pub poissons_ratio: f64,
    /// Mass density (kg/m³).
    pub density: f64,
}

impl Material {
    /// Create a new isotropic linear elastic material.
    ///
    /// # Arguments
    ///
    /// * `youngs_modulus` - Young's modulus E (Pa)
    /// * `poissons_ratio` - Poisson's ratio ν (dimensionless, -1 < ν < 0.5)
    /// * `density` - Mass density ρ (kg/m³)
    ///
    /// # Errors
    ///
    /// Returns error if material properties are physically invalid.
    pub fn new(youngs_modulus: f64, poissons_ratio: f64, density: f64) -> Result<Self> {
        let material = Self {
            youngs_modulus,
            poissons_ratio,
            density,
        };
        material.validate()?;
        Ok(material)
    }

    /// Check the physical admissibility of the parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.youngs_modulus > 0.0) {
            return Err(Error::InvalidConfig(
                "Young's modulus must be positive".into(),
            ));
        }
        if !(self.poissons_ratio > -1.0 && self.poissons_ratio < 0.5) {
            return Err(Error::InvalidConfig(
                "Poisson's ratio must be in range (-1, 0.5)".into(),
            ));
        }
        if !(self.density > 0.0) {
            return Err(Error::InvalidConfig("Density must be positive".into()));
        }
        Ok(())
    }

    /// Shear modulus G = E / (2(1 + ν)).
    pub fn shear_modulus(&self) -> f64 {
        self.youngs_modulus / (2.0 * (1.0 + self.poissons_ratio))
    }

    /// Lamé's first parameter λ = Eν / ((1+ν)(1-2ν)).
    pub fn lame_lambda(&self) -> f64 {
        let e = self.youngs_modulus;
        let nu = self.poissons_ratio;
        e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu))
    }

    /// Lamé's second parameter μ = G (shear modulus).
    pub fn lame_mu(&self) -> f64 {
        self.shear_modulus()
    }

    /// Express the parameters in the scaled unit system.
    pub fn in_units(&self, units: &UnitMultipliers) -> Self {
        Self {
            youngs_modulus: units.apply(self.youngs_modulus, Quantity::Stress),
            poissons_ratio: units.apply(self.poissons_ratio, Quantity::One),
            density: units.apply(self.density, Quantity::Density),
        }
    }
}

/// Common material presets.
impl Material {
    /// Aluminium (E = 70 GPa, ν = 0.35, ρ = 2799 kg/m³).
    pub fn aluminium() -> Self {
        Self {
            youngs_modulus: 70e9,
            poissons_ratio: 0.35,
            density: 2.799e3,
        }
    }

    /// Epoxy (E = 3.8 GPa, ν = 0.27, ρ = 1142 kg/m³).
    pub fn epoxy() -> Self {
        Self {
            youngs_modulus: 3.8e9,
            poissons_ratio: 0.27,
            density: 1.142e3,
        }
    }
}

/// One material region of the cell with its share of the averaging weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(flatten)]
    pub material: Material,
    /// Relative weight (volume or element fraction); normalized over all
    /// phases.
    #[serde(default = "default_fraction")]
    pub fraction: f64,
}

fn default_fraction() -> f64 {
    1.0
}

impl Phase {
    pub fn new(material: Material, fraction: f64) -> Self {
        Self { material, fraction }
    }
}

/// Pressure and shear wave speeds of the averaged homogeneous medium.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceWaves {
    /// c_p = √((λ̄ + 2μ̄) / ρ̄)
    pub p_wave_speed: f64,
    /// c_s = √(μ̄ / ρ̄)
    pub shear_wave_speed: f64,
}

impl ReferenceWaves {
    /// Average λ, μ and ρ over the phases, weighted by fraction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty phase list, invalid
    /// materials, or non-positive total weight.
    pub fn from_phases(phases: &[Phase]) -> Result<Self> {
        if phases.is_empty() {
            return Err(Error::InvalidConfig(
                "reference waves need at least one material phase".into(),
            ));
        }
        let mut weight = 0.0;
        let (mut lam, mut mu, mut rho) = (0.0, 0.0, 0.0);
        for phase in phases {
            phase.material.validate()?;
            if !(phase.fraction >= 0.0) || !phase.fraction.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "phase fraction must be non-negative, got {}",
                    phase.fraction
                )));
            }
            weight += phase.fraction;
            lam += phase.fraction * phase.material.lame_lambda();
            mu += phase.fraction * phase.material.lame_mu();
            rho += phase.fraction * phase.material.density;
        }
        if weight <= 0.0 {
            return Err(Error::InvalidConfig("phase fractions sum to zero".into()));
        }
        let (lam, mu, rho) = (lam / weight, mu / weight, rho / weight);

        Ok(Self {
            p_wave_speed: ((lam + 2.0 * mu) / rho).sqrt(),
            shear_wave_speed: (mu / rho).sqrt(),
        })
    }

    /// `(ω_p, ω_s)` at wave-number magnitude `kappa`.
    pub fn frequencies(&self, kappa: f64) -> [f64; 2] {
        [self.p_wave_speed * kappa, self.shear_wave_speed * kappa]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_invalid_parameters() {
        assert!(Material::new(-100e9, 0.3, 1000.0).is_err());
        assert!(Material::new(200e9, 0.5, 1000.0).is_err());
        assert!(Material::new(200e9, -1.0, 1000.0).is_err());
        assert!(Material::new(200e9, 0.3, 0.0).is_err());
        assert!(Material::new(200e9, 0.3, 7850.0).is_ok());
    }

    #[test]
    fn test_lame_parameters() {
        let mat = Material::new(200e9, 0.3, 7850.0).unwrap();
        // λ = 200e9 * 0.3 / (1.3 * 0.4), μ = 200e9 / 2.6
        assert_relative_eq!(mat.lame_lambda(), 200e9 * 0.3 / 0.52, max_relative = 1e-12);
        assert_relative_eq!(mat.lame_mu(), 200e9 / 2.6, max_relative = 1e-12);
    }

    #[test]
    fn test_single_phase_wave_speeds() {
        let mat = Material::aluminium();
        let waves = ReferenceWaves::from_phases(&[Phase::new(mat.clone(), 1.0)]).unwrap();
        let cp = ((mat.lame_lambda() + 2.0 * mat.lame_mu()) / mat.density).sqrt();
        let cs = (mat.lame_mu() / mat.density).sqrt();
        assert_relative_eq!(waves.p_wave_speed, cp, max_relative = 1e-12);
        assert_relative_eq!(waves.shear_wave_speed, cs, max_relative = 1e-12);
        assert!(waves.p_wave_speed > waves.shear_wave_speed);

        let [wp, ws] = waves.frequencies(10.0);
        assert_relative_eq!(wp, 10.0 * cp, max_relative = 1e-12);
        assert_relative_eq!(ws, 10.0 * cs, max_relative = 1e-12);
    }

    #[test]
    fn test_fractions_are_normalized() {
        let al = Material::aluminium();
        let ep = Material::epoxy();
        let a = ReferenceWaves::from_phases(&[
            Phase::new(al.clone(), 1.0),
            Phase::new(ep.clone(), 3.0),
        ])
        .unwrap();
        let b = ReferenceWaves::from_phases(&[Phase::new(al, 0.25), Phase::new(ep, 0.75)]).unwrap();
        assert_relative_eq!(a.p_wave_speed, b.p_wave_speed, max_relative = 1e-12);
        assert_relative_eq!(a.shear_wave_speed, b.shear_wave_speed, max_relative = 1e-12);
    }

    #[test]
    fn test_empty_phases_rejected() {
        assert!(ReferenceWaves::from_phases(&[]).is_err());
        let zero = Phase::new(Material::epoxy(), 0.0);
        assert!(ReferenceWaves::from_phases(&[zero]).is_err());
    }

    #[test]
    fn test_phase_from_json() {
        let phase: Phase = serde_json::from_str(
            r#"{"youngs_modulus": 3.8e9, "poissons_ratio": 0.27, "density": 1142.0}"#,
        )
        .unwrap();
        assert_eq!(phase.material, Material::epoxy());
        assert_eq!(phase.fraction, 1.0);
    }
}
