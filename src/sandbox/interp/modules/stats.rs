//! `scipy.stats`: standard scores and Pearson correlation with its p-value.

use super::super::error::{Eval, Fault};
use super::super::eval::Interpreter;
use super::super::frame::{Scalar, Series, mean, pearson_pairs, variance};
use super::super::pandas::{scalars_of, series_value};
use super::super::value::{Args, Builtin, Value};
use super::module_of;

static FUNCTIONS: &[Builtin] = &[
    Builtin { name: "zscore", func: zscore },
    Builtin { name: "pearsonr", func: pearsonr },
];

pub fn module() -> Value {
    module_of("scipy.stats", FUNCTIONS, Vec::new())
}

fn zscore(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let input = args.required(0, "a", "zscore")?;
    let values = scalars_of(interp, input)?;
    let ddof = match args.kw("ddof") {
        Some(v) => v.expect_int("ddof")?.max(0) as usize,
        None => 0,
    };
    let omit = match args.kw("nan_policy") {
        Some(policy) => match &*policy.expect_str("nan_policy")? {
            "omit" => true,
            "propagate" => false,
            "raise" if values.iter().any(Scalar::is_missing) => {
                return Err(Fault::value_error("The input contains nan values"));
            }
            "raise" => false,
            other => {
                return Err(Fault::value_error(format!(
                    "nan_policy must be one of {{'propagate', 'raise', 'omit'}}, got '{}'",
                    other
                )));
            }
        },
        None => false,
    };

    let mut numbers = Vec::with_capacity(values.len());
    for v in &values {
        match v.as_f64() {
            Some(f) => numbers.push(f),
            None => {
                return Err(Fault::type_error(format!(
                    "unsupported operand type for zscore: '{}'",
                    v.display()
                )));
            }
        }
    }
    let sample: Vec<f64> = if omit {
        numbers.iter().copied().filter(|f| !f.is_nan()).collect()
    } else {
        numbers.clone()
    };
    let (m, sd) = (mean(&sample), variance(&sample, ddof).sqrt());
    let scores: Vec<Scalar> = numbers.iter().map(|x| Scalar::Float((x - m) / sd)).collect();

    Ok(match input {
        Value::Series(s) => series_value(s.map_values(scores)),
        _ => series_value(Series::array(scores)),
    })
}

/// `(r, p)` with the two-sided p-value from Student's t on `n - 2` degrees of freedom.
fn pearsonr(interp: &mut Interpreter, args: Args) -> Eval<Value> {
    let x = scalars_of(interp, args.required(0, "x", "pearsonr")?)?;
    let y = scalars_of(interp, args.required(1, "y", "pearsonr")?)?;
    if x.len() != y.len() {
        return Err(Fault::value_error("x and y must have the same length."));
    }
    if x.len() < 2 {
        return Err(Fault::value_error("x and y must have length at least 2."));
    }
    let pairs = x
        .iter()
        .zip(&y)
        .map(|(a, b)| match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(Fault::type_error("pearsonr requires numeric input")),
        })
        .collect::<Eval<Vec<_>>>()?;
    let r = pearson_pairs(&pairs).clamp(-1.0, 1.0);
    let p = two_sided_p(r, pairs.len());
    Ok(Value::tuple(vec![Value::Float(r), Value::Float(p)]))
}

fn two_sided_p(r: f64, n: usize) -> f64 {
    if r.is_nan() || n < 3 {
        return if n == 2 && !r.is_nan() { 1.0 } else { f64::NAN };
    }
    if r.abs() == 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t2 = r * r * df / (1.0 - r * r);
    incomplete_beta(df / 2.0, 0.5, df / (df + t2))
}

/// Lanczos approximation (g = 7, n = 9).
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + 7.5;
    let series = COEFFS[1..]
        .iter()
        .enumerate()
        .fold(COEFFS[0], |acc, (i, c)| acc + c / (x + i as f64 + 1.0));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Regularized incomplete beta `I_x(a, b)`.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let log_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = log_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_fraction(b, a, 1.0 - x) / b
    }
}

/// Continued fraction for the incomplete beta, modified Lentz.
fn beta_fraction(a: f64, b: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-300;
    const EPS: f64 = 1e-15;
    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..300 {
        let m = m as f64;
        let m2 = 2.0 * m;
        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        h *= d * c;
        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_ln_gamma_matches_factorials() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-12));
        assert!(close(ln_gamma(5.0), 24f64.ln(), 1e-10));
        assert!(close(ln_gamma(0.5), std::f64::consts::PI.sqrt().ln(), 1e-10));
    }

    #[test]
    fn test_incomplete_beta_known_values() {
        assert!(close(incomplete_beta(1.0, 1.0, 0.3), 0.3, 1e-12));
        assert!(close(incomplete_beta(2.0, 1.0, 0.5), 0.25, 1e-12));
        assert!(close(incomplete_beta(2.0, 3.0, 0.4), 0.5248, 1e-10));
    }

    #[test]
    fn test_pearsonr_p_value() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 1_000_000);
        interp
            .run(
                "from scipy import stats\n\
                 r, p = stats.pearsonr([1, 2, 3, 4, 5], [2, 4, 5, 4, 5])\n",
            )
            .unwrap();
        let locals = interp.locals();
        let get = |name: &str| {
            locals.iter().find(|(k, _)| k == name).and_then(|(_, v)| v.as_f64()).unwrap()
        };
        assert!(close(get("r"), 0.774_596_669_241_483_4, 1e-12));
        assert!(close(get("p"), 0.124_027_062_657, 1e-6));
    }

    #[test]
    fn test_perfect_correlation_has_zero_p() {
        assert_eq!(two_sided_p(1.0, 10), 0.0);
        assert!(two_sided_p(f64::NAN, 10).is_nan());
    }

    #[test]
    fn test_zscore_population() {
        let mut interp = Interpreter::new(std::env::temp_dir(), 1_000_000);
        interp
            .run("from scipy import stats\nz = stats.zscore([1, 2, 3]).tolist()\n")
            .unwrap();
        let z = interp.locals().into_iter().find(|(k, _)| k == "z").unwrap().1.repr();
        assert_eq!(z, "[-1.224744871391589, 0.0, 1.224744871391589]");
    }
}
