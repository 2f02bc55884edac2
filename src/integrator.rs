use std::sync::{Arc, Mutex, MutexGuard};

use crate::equation::PositionEquation;
use crate::error::EquationParseError;

/// Elapsed nanoseconds are divided by this before substitution into the equation.
pub const TIME_SCALE: f64 = 3_000_000_000.0;

/// Drift accumulator fed by the position equation.
///
/// Both axes receive the same scalar delta on every evaluation and are never
/// reset, so latitude and longitude stay equal for the life of the session.
#[derive(Debug, Default)]
pub struct PositionIntegrator {
    equation: Option<PositionEquation>,
    latitude: f64,
    longitude: f64,
    samples: u64,
}

impl PositionIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equation(text: &str) -> Result<Self, EquationParseError> {
        let mut integrator = Self::new();
        integrator.set_equation(text)?;
        Ok(integrator)
    }

    /// Replace the equation. On error the previous equation is kept.
    pub fn set_equation(&mut self, text: &str) -> Result<(), EquationParseError> {
        let equation = PositionEquation::parse(text)?;
        self.equation = Some(equation);
        Ok(())
    }

    pub fn equation(&self) -> Option<&PositionEquation> {
        self.equation.as_ref()
    }

    /// Add the equation's value at `elapsed_nanos / TIME_SCALE` to both axes
    /// and return the new pair.
    pub fn evaluate(&mut self, elapsed_nanos: f64) -> (f64, f64) {
        self.samples += 1;

        let Some(equation) = self.equation.as_ref() else {
            return (self.latitude, self.longitude);
        };

        let delta = equation.eval(elapsed_nanos / TIME_SCALE);
        if !delta.is_finite() {
            log::warn!(
                "Equation \"{}\" produced non-finite delta {} at t={}, position unchanged",
                equation,
                delta,
                elapsed_nanos
            );
            return (self.latitude, self.longitude);
        }

        self.latitude += delta;
        self.longitude += delta;
        (self.latitude, self.longitude)
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Number of evaluations, i.e. samples produced so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Integrator shared between the equation input thread and the burst generator.
#[derive(Clone, Debug, Default)]
pub struct SharedIntegrator {
    inner: Arc<Mutex<PositionIntegrator>>,
}

impl SharedIntegrator {
    pub fn new(integrator: PositionIntegrator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(integrator)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PositionIntegrator> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_equation(&self, text: &str) -> Result<(), EquationParseError> {
        self.lock().set_equation(text)
    }

    pub fn evaluate(&self, elapsed_nanos: f64) -> (f64, f64) {
        self.lock().evaluate(elapsed_nanos)
    }

    pub fn position(&self) -> (f64, f64) {
        self.lock().position()
    }

    pub fn samples(&self) -> u64 {
        self.lock().samples()
    }

    pub fn has_equation(&self) -> bool {
        self.lock().equation().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_starts_at_origin() {
        let integrator = PositionIntegrator::new();
        assert_eq!(integrator.position(), (0.0, 0.0));
        assert!(integrator.equation().is_none());
    }

    #[test]
    fn test_identity_equation_accumulates_scaled_time() {
        let mut integrator = PositionIntegrator::with_equation("x").unwrap();

        let t1 = 3.0e9;
        let t2 = 6.0e9;
        assert_eq!(integrator.evaluate(t1), (1.0, 1.0));
        assert_eq!(integrator.evaluate(t2), (3.0, 3.0));
        assert_eq!(integrator.samples(), 2);
    }

    #[test]
    fn test_sum_of_deltas_and_axes_equal() {
        let mut integrator = PositionIntegrator::with_equation("sin(x) * 0.5").unwrap();
        let times = [1.0e9, 2.5e9, 7.0e9, 1.2e10, 3.3e10];

        let mut expected = 0.0;
        for t in times {
            expected += (t / TIME_SCALE).sin() * 0.5;
            let (lat, lon) = integrator.evaluate(t);
            assert_eq!(lat, lon);
            assert_relative_eq!(lat, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_malformed_equation_keeps_previous() {
        let mut integrator = PositionIntegrator::with_equation("2").unwrap();
        assert!(integrator.set_equation("x +").is_err());
        assert_eq!(integrator.equation().unwrap().source(), "2");
        assert_eq!(integrator.evaluate(0.0), (2.0, 2.0));
    }

    #[test]
    fn test_malformed_equation_from_empty_state() {
        let mut integrator = PositionIntegrator::new();
        assert!(integrator.set_equation("x +").is_err());
        assert!(integrator.equation().is_none());
    }

    #[test]
    fn test_replacement_is_not_retroactive() {
        let mut integrator = PositionIntegrator::with_equation("1").unwrap();
        integrator.evaluate(0.0);
        integrator.set_equation("10").unwrap();
        assert_eq!(integrator.evaluate(0.0), (11.0, 11.0));
    }

    #[test]
    fn test_non_finite_delta_skipped() {
        let mut integrator = PositionIntegrator::with_equation("1 + 1/x").unwrap();
        assert_eq!(integrator.evaluate(0.0), (0.0, 0.0));
        assert_eq!(integrator.evaluate(3.0e9), (2.0, 2.0));
    }

    #[test]
    fn test_no_equation_yields_unchanged_position() {
        let mut integrator = PositionIntegrator::new();
        assert_eq!(integrator.evaluate(5.0e9), (0.0, 0.0));
        assert_eq!(integrator.samples(), 1);
    }

    #[test]
    fn test_shared_integrator_is_shared() {
        let shared = SharedIntegrator::default();
        let other = shared.clone();
        other.set_equation("3").unwrap();
        assert!(shared.has_equation());
        assert_eq!(shared.evaluate(0.0), (3.0, 3.0));
        assert_eq!(other.position(), (3.0, 3.0));
    }
}
