//! Bilinear-20C water-temperature law: a heating curve defined by two
//! calibration points and a non-linearity exponent, bent at a precomputed
//! inflexion so the curve passes exactly through both points.

use crate::data::types::Temperature;
use crate::data::validation::validate_bilinear_params;
use hc_error::Result;

/// Precomputed bilinear heating curve. Build once via [`make_bilinear`],
/// then call [`Bilinear::water_temp`] every tick.
#[derive(Debug, Clone, Copy)]
pub struct Bilinear {
    tout1: i64,
    twater1: i64,
    tout2: i64,
    twater2: i64,
    nh100: i32,
    inflexion: i64,
    slope_low: f64,
    slope_high: f64,
}

/// Builds a bilinear-20C law from the two calibration points and the
/// non-linearity exponent `nH100` (hundredths of the curve's exponent).
/// Precomputes the inflexion point and the two segment slopes so
/// `water_temp` is a handful of arithmetic ops per call.
pub fn make_bilinear(
    tout1: Temperature,
    twater1: Temperature,
    tout2: Temperature,
    twater2: Temperature,
    nh100: i32,
) -> Result<Bilinear> {
    validate_bilinear_params(tout1, twater1, tout2, twater2, nh100)?;

    let tout1 = tout1.millikelvin();
    let twater1 = twater1.millikelvin();
    let tout2 = tout2.millikelvin();
    let twater2 = twater2.millikelvin();

    // nH100 bends the curve: 100 is linear, <100 convex, >100 concave.
    // The inflexion sits at the outdoor midpoint, shifted by the exponent.
    let mid = (tout1 + tout2) / 2;
    let bend = ((nh100 - 100) as i64 * (tout2 - tout1)) / 400;
    let inflexion = mid + bend;

    let span_low = (inflexion - tout1).max(1) as f64;
    let span_high = (tout2 - inflexion).max(1) as f64;
    let water_span = (twater1 - twater2) as f64;

    // slope_low covers [tout1, inflexion], slope_high covers [inflexion, tout2].
    // Both drive water temp from twater1 (at tout1) down to twater2 (at tout2),
    // weighted so the curve is steeper on one side when nH100 != 100.
    let slope_low = -(water_span * (span_high / (span_low + span_high))) / span_low;
    let slope_high = -(water_span * (span_low / (span_low + span_high))) / span_high;

    Ok(Bilinear {
        tout1,
        twater1,
        tout2,
        twater2,
        nh100,
        inflexion,
        slope_low,
        slope_high,
    })
}

impl Bilinear {
    /// Evaluates the law at `outdoor`, shifting the result by
    /// `target_ambient - 20C` since the calibration is defined for a 20C
    /// room.
    pub fn water_temp(&self, outdoor: Temperature, target_ambient: Temperature) -> Temperature {
        let tout = outdoor.millikelvin().clamp(self.tout1, self.tout2);

        let base = if tout <= self.inflexion {
            self.twater1 as f64 + self.slope_low * (tout - self.tout1) as f64
        } else {
            let at_inflexion = self.twater1 as f64 + self.slope_low * (self.inflexion - self.tout1) as f64;
            at_inflexion + self.slope_high * (tout - self.inflexion) as f64
        };

        let reference_ambient_mk = crate::constants::curve::REFERENCE_AMBIENT_C as i64 * crate::constants::KPRECISION;
        let ambient_shift = target_ambient.millikelvin() - reference_ambient_mk;

        Temperature::from_millikelvin(base.round() as i64 + ambient_shift)
    }

    pub fn nh100(&self) -> i32 {
        self.nh100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> Bilinear {
        make_bilinear(
            Temperature::from_celsius(-10.0),
            Temperature::from_celsius(65.0),
            Temperature::from_celsius(15.0),
            Temperature::from_celsius(30.0),
            130,
        )
        .unwrap()
    }

    #[test]
    fn passes_through_calibration_points_at_reference_ambient() {
        let c = curve();
        let ref_ambient = Temperature::from_celsius(20.0);
        let w1 = c.water_temp(Temperature::from_celsius(-10.0), ref_ambient);
        let w2 = c.water_temp(Temperature::from_celsius(15.0), ref_ambient);
        assert!((w1.celsius() - 65.0).abs() < 0.5);
        assert!((w2.celsius() - 30.0).abs() < 0.5);
    }

    #[test]
    fn colder_outdoor_yields_hotter_water() {
        let c = curve();
        let ref_ambient = Temperature::from_celsius(20.0);
        let cold = c.water_temp(Temperature::from_celsius(-5.0), ref_ambient);
        let mild = c.water_temp(Temperature::from_celsius(10.0), ref_ambient);
        assert!(cold.celsius() > mild.celsius());
    }

    #[test]
    fn ambient_shift_is_additive() {
        let c = curve();
        let base = c.water_temp(Temperature::from_celsius(0.0), Temperature::from_celsius(20.0));
        let shifted = c.water_temp(Temperature::from_celsius(0.0), Temperature::from_celsius(22.0));
        assert!((shifted.celsius() - base.celsius() - 2.0).abs() < 0.1);
    }

    #[test]
    fn rejects_invalid_calibration() {
        assert!(make_bilinear(
            Temperature::from_celsius(15.0),
            Temperature::from_celsius(65.0),
            Temperature::from_celsius(-10.0),
            Temperature::from_celsius(30.0),
            130,
        )
        .is_err());
    }
}
