//! Number and duration formatting shared by the status producers.

/// Round half toward positive infinity, matching the display rounding
/// watchfaces expect (`-2.5` rounds to `-2`).
pub fn js_round(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Fixed-point formatting with half-away-from-zero rounding.
pub fn to_fixed(x: f64, digits: usize) -> String {
    let scale = 10f64.powi(digits as i32);
    let rounded = (x * scale).round() / scale;
    format!("{rounded:.digits$}")
}

/// Shortest decimal rendering: integers without a fractional part.
pub fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

/// Basal rate rendering: one decimal when that loses nothing against two,
/// otherwise two. Zero renders as `0`.
pub fn round_basal(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let one = to_fixed(n, 1);
    let two = to_fixed(n, 2);
    if one.parse::<f64>().ok() == two.parse::<f64>().ok() {
        one
    } else {
        two
    }
}

/// One decimal, except values that round to zero render as `0`.
pub fn round_or_zero(x: f64) -> String {
    let fixed = to_fixed(x, 1);
    if fixed == "0.0" || fixed == "-0.0" {
        "0".to_string()
    } else {
        fixed
    }
}

/// Prefix non-negative numbers with `+`.
pub fn add_plus(s: &str) -> String {
    if s.starts_with('-') {
        s.to_string()
    } else {
        format!("+{s}")
    }
}

/// Elapsed time as `Nm` under an hour, `NhM` above.
pub fn ago(ms: i64) -> String {
    let minutes = js_round(ms as f64 / 60_000.0) as i64;
    if minutes < 60 {
        format!("{minutes}m")
    } else {
        format!("{}h{}", minutes / 60, minutes % 60)
    }
}

/// mg/dL to mmol/L with one decimal.
pub fn mgdl_to_mmol(mgdl: f64) -> String {
    to_fixed(mgdl / 18.0, 1)
}

/// Cut `s` to at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
