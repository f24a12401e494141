//! Trailing moving average.
//!
//! Not used on the ingestion path; exposed for consumers that want to
//! smooth a series pulled from the sample window before plotting it.

/// Trailing arithmetic mean of `values` over `window` points.
///
/// `result[i]` is the mean of `values[i + 1 - window ..= i]`, clipped at the
/// start of the slice, so the first `window - 1` outputs average fewer
/// points rather than being padded. A `window` of 0 behaves as 1.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            // Each mean comes from its own slice so one non-finite or huge
            // value cannot leak into later windows.
            let slice = &values[(i + 1).saturating_sub(window)..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}
