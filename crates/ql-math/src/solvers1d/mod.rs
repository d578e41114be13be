//! 1D root finding.
//!
//! Brent's method on a known bracket, plus a bracketing driver for monotone
//! functions whose root location is only roughly known (quantile inversion of
//! numerically defined CDFs, default-time inversion of survival curves).

use ql_core::{
    errors::{Error, Result},
    Real,
};

const MAX_ITERATIONS: u32 = 100;
const MAX_BRACKET_EXPANSIONS: u32 = 60;
const DEFAULT_ACCURACY: Real = 1.0e-11;

// ── Brent ─────────────────────────────────────────────────────────────────────

/// Brent's method for finding a root of `f(x)` in `[x_min, x_max]`.
///
/// Combines bisection, secant, and inverse quadratic interpolation.
pub fn brent<F>(mut f: F, x_min: Real, x_max: Real, accuracy: Real) -> Result<Real>
where
    F: FnMut(Real) -> Real,
{
    let acc = if accuracy > 0.0 {
        accuracy
    } else {
        DEFAULT_ACCURACY
    };
    let mut a = x_min;
    let mut b = x_max;
    let mut fa = f(a);
    let mut fb = f(b);

    if fa * fb > 0.0 {
        return Err(Error::Precondition(format!(
            "Brent: f({a}) and f({b}) must have opposite signs"
        )));
    }
    if fa == 0.0 {
        return Ok(a);
    }
    if fb == 0.0 {
        return Ok(b);
    }

    let mut c = b;
    let mut fc = fb;
    let mut d = b - a;
    let mut e = d;

    for _ in 0..MAX_ITERATIONS {
        if fb * fc > 0.0 {
            c = a;
            fc = fa;
            d = b - a;
            e = d;
        }
        if fc.abs() < fb.abs() {
            a = b;
            b = c;
            c = a;
            fa = fb;
            fb = fc;
            fc = fa;
        }
        let tol = 2.0 * f64::EPSILON * b.abs() + 0.5 * acc;
        let xm = 0.5 * (c - b);
        if xm.abs() <= tol || fb == 0.0 {
            return Ok(b);
        }
        if e.abs() >= tol && fa.abs() > fb.abs() {
            let s = fb / fa;
            let (p, q) = if a == c {
                (2.0 * xm * s, 1.0 - s)
            } else {
                let q = fa / fc;
                let r = fb / fc;
                let p = s * (2.0 * xm * q * (q - r) - (b - a) * (r - 1.0));
                let q = (q - 1.0) * (r - 1.0) * (s - 1.0);
                (p, q)
            };
            let (p, q) = if p > 0.0 { (p, -q) } else { (-p, q) };
            if 2.0 * p < (3.0 * xm * q - (tol * q).abs()) && 2.0 * p < (e * q).abs() {
                e = d;
                d = p / q;
            } else {
                d = xm;
                e = d;
            }
        } else {
            d = xm;
            e = d;
        }
        a = b;
        fa = fb;
        b += if d.abs() > tol {
            d
        } else if xm > 0.0 {
            tol
        } else {
            -tol
        };
        fb = f(b);
    }
    Err(Error::Runtime(
        "Brent solver: maximum iterations reached".into(),
    ))
}

// ── Bracketing driver ────────────────────────────────────────────────────────

/// Solve `f(x) = 0` for an increasing `f`, starting from the guess interval
/// `[x_lo, x_hi]` and widening it geometrically until the root is bracketed.
///
/// `lower_bound` stops the expansion to the left (e.g. `0.0` for times).
pub fn solve_increasing<F>(
    mut f: F,
    mut x_lo: Real,
    mut x_hi: Real,
    lower_bound: Option<Real>,
    accuracy: Real,
) -> Result<Real>
where
    F: FnMut(Real) -> Real,
{
    ql_core::ensure!(x_hi > x_lo, "empty initial bracket [{x_lo}, {x_hi}]");
    let mut f_lo = f(x_lo);
    let mut f_hi = f(x_hi);
    let mut expansions = 0;
    while f_lo > 0.0 || f_hi < 0.0 {
        if expansions == MAX_BRACKET_EXPANSIONS {
            return Err(Error::Runtime(format!(
                "could not bracket root: f({x_lo}) = {f_lo}, f({x_hi}) = {f_hi}"
            )));
        }
        expansions += 1;
        let width = x_hi - x_lo;
        if f_lo > 0.0 {
            x_lo -= width;
            if let Some(lb) = lower_bound {
                if x_lo <= lb {
                    x_lo = lb;
                    f_lo = f(x_lo);
                    if f_lo > 0.0 {
                        return Ok(lb);
                    }
                    continue;
                }
            }
            f_lo = f(x_lo);
        } else {
            x_hi += width;
            f_hi = f(x_hi);
        }
    }
    brent(f, x_lo, x_hi, accuracy)
}
