//! Numeric primitives shared by the detector components
//!
//! Everything here returns `Option<f64>` instead of producing `NaN` or
//! infinities: a `None` means "undefined" and callers must treat it as
//! "nothing can be scored this bar".

/// Arithmetic mean. `None` for an empty input.
#[inline]
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Population standard deviation. `None` with fewer than two samples.
#[inline]
pub fn population_std<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let count = iter.clone().count();
    if count < 2 {
        return None;
    }
    let m = mean(iter.clone())?;
    let var = iter.map(|v| (v - m) * (v - m)).sum::<f64>() / count as f64;
    Some(var.sqrt())
}

/// `value` if it is finite and strictly positive.
///
/// Zero spreads and zero averages are degenerate normalizers.
#[inline]
pub fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// `num / den` when `den` is a usable normalizer.
#[inline]
pub fn normalized(num: f64, den: Option<f64>) -> Option<f64> {
    let den = positive(den)?;
    let r = num / den;
    r.is_finite().then_some(r)
}
