pub mod normalize;
pub mod smoothing;

/// Linear interpolation of `x` from `from` onto `to`, holding the end values
/// outside the input range.
pub fn interp(x: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    let (x0, x1) = from;
    let (y0, y1) = to;
    if x <= x0 {
        return y0;
    }
    if x >= x1 {
        return y1;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}
