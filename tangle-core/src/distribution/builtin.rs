//! Built-in distribution families.
//!
//! | family      | params              | value          |
//! |-------------|---------------------|----------------|
//! | `flip`      | `[p]`               | `Bool`         |
//! | `discrete`  | `[Vector(weights)]` | `Int` (index)  |
//! | `gaussian`  | `[mean, sd]`        | `Real`         |
//! | `beta`      | `[a, b]`            | `Real`         |
//! | `dirichlet` | `[Vector(alphas)]`  | `Vector`       |

use rand::distributions::{Distribution as _, WeightedIndex};
use rand::{Rng, RngCore};
use statrs::distribution::{Beta, Continuous, Gamma, Normal};
use statrs::function::gamma::ln_gamma;

use super::Distribution;
use crate::error::{EngineError, Result};
use crate::graph::Value;

fn arity(family: &str, params: &[Value], expected: usize) -> Result<()> {
    if params.len() != expected {
        return Err(EngineError::config(format!(
            "{family} takes {expected} parameter(s), got {}",
            params.len()
        )));
    }
    Ok(())
}

fn probability(params: &[Value]) -> Result<f64> {
    arity("flip", params, 1)?;
    let p = params[0].as_real()?;
    if !(0.0..=1.0).contains(&p) {
        return Err(EngineError::config(format!("flip probability {p} outside [0, 1]")));
    }
    Ok(p)
}

fn flip_sample(params: &[Value], rng: &mut dyn RngCore) -> Result<Value> {
    let p = probability(params)?;
    Ok(Value::Bool(rng.gen::<f64>() < p))
}

fn flip_log_density(value: &Value, params: &[Value]) -> Result<f64> {
    let p = probability(params)?;
    Ok(if value.as_bool()? { p.ln() } else { (1.0 - p).ln() })
}

/// Bernoulli trial.
pub fn flip() -> Distribution {
    Distribution::from_parts(
        "flip".into(),
        Box::new(flip_sample),
        Box::new(flip_log_density),
        None,
    )
}

fn weights(params: &[Value]) -> Result<&[f64]> {
    arity("discrete", params, 1)?;
    let weights = params[0].as_vector()?;
    if weights.is_empty() || weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(EngineError::config(
            "discrete weights must be a non-empty vector of finite, non-negative numbers",
        ));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(EngineError::config("discrete weights must not all be zero"));
    }
    Ok(weights)
}

fn discrete_sample(params: &[Value], rng: &mut dyn RngCore) -> Result<Value> {
    let index = WeightedIndex::new(weights(params)?)
        .map_err(|e| EngineError::config(format!("discrete weights: {e}")))?;
    Ok(Value::Int(index.sample(rng) as i64))
}

fn discrete_log_density(value: &Value, params: &[Value]) -> Result<f64> {
    let weights = weights(params)?;
    let total: f64 = weights.iter().sum();
    let index = value.as_int()?;
    Ok(usize::try_from(index)
        .ok()
        .and_then(|i| weights.get(i))
        .map_or(f64::NEG_INFINITY, |w| (w / total).ln()))
}

/// Categorical over indices `0..weights.len()`; weights need not be normalized.
pub fn discrete() -> Distribution {
    Distribution::from_parts(
        "discrete".into(),
        Box::new(discrete_sample),
        Box::new(discrete_log_density),
        None,
    )
}

fn normal(params: &[Value]) -> Result<Normal> {
    arity("gaussian", params, 2)?;
    let mean = params[0].as_real()?;
    let sd = params[1].as_real()?;
    Normal::new(mean, sd).map_err(|e| EngineError::config(format!("gaussian({mean}, {sd}): {e}")))
}

fn gaussian_sample(params: &[Value], rng: &mut dyn RngCore) -> Result<Value> {
    Ok(Value::Real(normal(params)?.sample(rng)))
}

fn gaussian_log_density(value: &Value, params: &[Value]) -> Result<f64> {
    Ok(normal(params)?.ln_pdf(value.as_real()?))
}

/// Normal distribution parameterized by mean and standard deviation.
pub fn gaussian() -> Distribution {
    Distribution::from_parts(
        "gaussian".into(),
        Box::new(gaussian_sample),
        Box::new(gaussian_log_density),
        None,
    )
}

fn beta_of(params: &[Value]) -> Result<Beta> {
    arity("beta", params, 2)?;
    let a = params[0].as_real()?;
    let b = params[1].as_real()?;
    Beta::new(a, b).map_err(|e| EngineError::config(format!("beta({a}, {b}): {e}")))
}

fn beta_sample(params: &[Value], rng: &mut dyn RngCore) -> Result<Value> {
    Ok(Value::Real(beta_of(params)?.sample(rng)))
}

fn beta_log_density(value: &Value, params: &[Value]) -> Result<f64> {
    let dist = beta_of(params)?;
    let x = value.as_real()?;
    if !(0.0..=1.0).contains(&x) {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(dist.ln_pdf(x))
}

/// Beta over `[0, 1]` with shape parameters `alpha` and `beta`.
pub fn beta() -> Distribution {
    Distribution::from_parts(
        "beta".into(),
        Box::new(beta_sample),
        Box::new(beta_log_density),
        None,
    )
}

fn alphas(params: &[Value]) -> Result<&[f64]> {
    arity("dirichlet", params, 1)?;
    let alphas = params[0].as_vector()?;
    if alphas.len() < 2 || alphas.iter().any(|a| !a.is_finite() || *a <= 0.0) {
        return Err(EngineError::config(
            "dirichlet needs at least two finite, positive concentrations",
        ));
    }
    Ok(alphas)
}

fn dirichlet_sample(params: &[Value], rng: &mut dyn RngCore) -> Result<Value> {
    let alphas = alphas(params)?;
    let mut draws = Vec::with_capacity(alphas.len());
    for &alpha in alphas {
        let gamma = Gamma::new(alpha, 1.0)
            .map_err(|e| EngineError::config(format!("dirichlet concentration {alpha}: {e}")))?;
        draws.push(gamma.sample(rng));
    }
    let total: f64 = draws.iter().sum();
    Ok(Value::Vector(draws.into_iter().map(|x| x / total).collect()))
}

fn dirichlet_log_density(value: &Value, params: &[Value]) -> Result<f64> {
    let x = value.as_vector()?;
    let alphas = alphas(params)?;
    if x.len() != alphas.len() {
        return Err(EngineError::config(format!(
            "dirichlet value has {} components but {} concentrations were given",
            x.len(),
            alphas.len()
        )));
    }
    if x.iter().any(|xi| !(0.0..=1.0).contains(xi)) {
        return Ok(f64::NEG_INFINITY);
    }
    let alpha_sum: f64 = alphas.iter().sum();
    let normalizer = ln_gamma(alpha_sum) - alphas.iter().map(|&a| ln_gamma(a)).sum::<f64>();
    let kernel: f64 = x
        .iter()
        .zip(alphas)
        .map(|(&xi, &a)| (a - 1.0) * xi.ln())
        .sum();
    Ok(normalizer + kernel)
}

/// Dirichlet over the probability simplex.
pub fn dirichlet() -> Distribution {
    Distribution::from_parts(
        "dirichlet".into(),
        Box::new(dirichlet_sample),
        Box::new(dirichlet_log_density),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::params;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn flip_scores_both_outcomes() {
        let dist = flip();
        let p = params([0.3]);
        let yes = dist.log_density(&Value::Bool(true), &p).unwrap();
        let no = dist.log_density(&Value::Bool(false), &p).unwrap();
        assert!((yes - 0.3f64.ln()).abs() < 1e-12);
        assert!((no - 0.7f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn flip_rejects_bad_probability() {
        let err = flip().sample(&params([1.5]), &mut StdRng::seed_from_u64(0));
        assert!(matches!(err, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn discrete_rejects_all_zero_weights() {
        let dist = discrete();
        let p = params([Value::Vector(vec![0.0, 0.0])]);
        let err = dist.log_density(&Value::Int(0), &p).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        let mut rng = StdRng::seed_from_u64(3);
        assert!(dist.sample(&p, &mut rng).is_err());

        let one_live = params([Value::Vector(vec![0.0, 2.0])]);
        assert_eq!(dist.log_density(&Value::Int(1), &one_live).unwrap(), 0.0);
    }

    #[test]
    fn discrete_normalizes_weights() {
        let dist = discrete();
        let p = params([Value::Vector(vec![1.0, 3.0])]);
        let ld = dist.log_density(&Value::Int(1), &p).unwrap();
        assert!((ld - 0.75f64.ln()).abs() < 1e-12);
        assert_eq!(
            dist.log_density(&Value::Int(5), &p).unwrap(),
            f64::NEG_INFINITY
        );

        let mut rng = StdRng::seed_from_u64(3);
        let draw = dist.sample(&p, &mut rng).unwrap().as_int().unwrap();
        assert!((0..2).contains(&draw));
    }

    #[test]
    fn gaussian_density_matches_closed_form() {
        let ld = gaussian()
            .log_density(&Value::Real(1.0), &params([0.0, 1.0]))
            .unwrap();
        let expected = -0.5 * (2.0 * std::f64::consts::PI).ln() - 0.5;
        assert!((ld - expected).abs() < 1e-9);
    }

    #[test]
    fn gaussian_rejects_negative_sd() {
        let err = gaussian().log_density(&Value::Real(0.0), &params([0.0, -1.0]));
        assert!(matches!(err, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn beta_draws_stay_in_the_unit_interval() {
        let dist = beta();
        let p = params([2.0, 5.0]);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let x = dist.sample(&p, &mut rng).unwrap().as_real().unwrap();
            assert!((0.0..=1.0).contains(&x));
        }
        assert_eq!(
            dist.log_density(&Value::Real(1.5), &p).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn dirichlet_draws_lie_on_the_simplex() {
        let dist = dirichlet();
        let p = params([Value::Vector(vec![1.0, 2.0, 3.0])]);
        let mut rng = StdRng::seed_from_u64(5);
        let draw = dist.sample(&p, &mut rng).unwrap();
        let x = draw.as_vector().unwrap();
        assert_eq!(x.len(), 3);
        assert!((x.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(dist.log_density(&draw, &p).unwrap().is_finite());
    }

    #[test]
    fn dirichlet_uniform_density_is_log_gamma_of_dimension() {
        // Dirichlet(1, 1, 1) is uniform on the simplex with density Γ(3) = 2.
        let ld = dirichlet()
            .log_density(
                &Value::Vector(vec![0.2, 0.3, 0.5]),
                &params([Value::Vector(vec![1.0, 1.0, 1.0])]),
            )
            .unwrap();
        assert!((ld - 2f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn dirichlet_dimension_mismatch_is_a_configuration_error() {
        let err = dirichlet().log_density(
            &Value::Vector(vec![0.5, 0.5]),
            &params([Value::Vector(vec![1.0, 1.0, 1.0])]),
        );
        assert!(matches!(err, Err(EngineError::Configuration(_))));
    }
}
