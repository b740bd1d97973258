//! # Thermopile Calibration
//!
//! Derives object temperature from a thermopile sensor's raw voltage and its
//! die temperature using the manufacturer's polynomial model.
//!
//! ```text
//! S    = S0 * (1 + a1*(Tenv - Tref) + a2*(Tenv - Tref)^2)
//! Vos  = b0 + b1*(Tenv - Tref) + b2*(Tenv - Tref)^2
//! fObj = (Vobj - Vos) + c2*(Vobj - Vos)^2
//! Tobj = (Tenv^4 + fObj/S)^0.25 - 273.15
//! ```
//!
//! `Vobj` is in volts, `Tenv` in kelvin, the result in degrees Celsius.

/// Reference die temperature in kelvin
pub const T_REF: f64 = 298.15;

/// Offset between kelvin and degrees Celsius
pub const KELVIN_OFFSET: f64 = 273.15;

/// Calibration constants of the thermopile model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermopileCalibration {
    pub s0: f64,
    pub a1: f64,
    pub a2: f64,
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub c2: f64,
    pub t_ref: f64,
}

impl Default for ThermopileCalibration {
    /// Factory defaults for the sensor
    fn default() -> Self {
        Self {
            s0: 6.0e-14,
            a1: 1.75e-3,
            a2: -1.678e-5,
            b0: -2.94e-5,
            b1: -5.7e-7,
            b2: 4.63e-9,
            c2: 13.4,
            t_ref: T_REF,
        }
    }
}

impl ThermopileCalibration {
    /// Object temperature in degrees Celsius
    ///
    /// # Arguments
    ///
    /// * `v_obj` - Thermopile voltage in volts
    /// * `t_env` - Die temperature in kelvin
    ///
    /// # Examples
    ///
    /// ```
    /// use equine_telemetry::calc::thermopile::ThermopileCalibration;
    ///
    /// let cal = ThermopileCalibration::default();
    /// // No signal beyond the offset voltage at Tref: object matches the die
    /// let t = cal.object_temperature(-2.94e-5, 298.15);
    /// assert!((t - 25.0).abs() < 1e-6);
    /// ```
    #[must_use]
    pub fn object_temperature(&self, v_obj: f64, t_env: f64) -> f64 {
        let dt = t_env - self.t_ref;
        let s = self.s0 * (1.0 + self.a1 * dt + self.a2 * dt.powi(2));
        let v_os = self.b0 + self.b1 * dt + self.b2 * dt.powi(2);
        let dv = v_obj - v_os;
        let f_obj = dv + self.c2 * dv.powi(2);

        (t_env.powi(4) + f_obj / s).powf(0.25) - KELVIN_OFFSET
    }
}

/// Object temperature using the factory calibration
pub fn object_temperature(v_obj: f64, t_env: f64) -> f64 {
    ThermopileCalibration::default().object_temperature(v_obj, t_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn test_golden_values() {
        let cases = [
            (0.0, 298.15, 29.520_009_975_234_13),
            (-2.94e-5, 298.15, 25.0),
            (1.0e-5, 300.0, 32.889_296_185_747_696),
            (-5.0e-6, 303.15, 33.948_331_082_566_94),
        ];

        for (v_obj, t_env, expected) in cases {
            let actual = object_temperature(v_obj, t_env);
            assert!(
                (actual - expected).abs() < TOLERANCE,
                "v_obj={} t_env={}: expected {}, got {}",
                v_obj,
                t_env,
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_positive_voltage_reads_warmer() {
        let cal = ThermopileCalibration::default();
        let ambient = cal.object_temperature(cal.b0, T_REF);
        assert!(cal.object_temperature(1.0e-4, T_REF) > ambient);
        assert!(cal.object_temperature(-1.0e-4, T_REF) < ambient);
    }

    #[test]
    fn test_default_constants() {
        let cal = ThermopileCalibration::default();
        assert_eq!(cal.s0, 0.000_000_000_000_06);
        assert_eq!(cal.c2, 13.4);
        assert_eq!(cal.t_ref, 298.15);
    }
}
