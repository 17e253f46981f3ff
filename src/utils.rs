/// `numerator / denominator * 100`, unresolved when either side is missing or
/// the denominator is zero.
pub fn percentage_of(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let num = numerator?;
    let den = denominator?;
    if den == 0.0 {
        return None;
    }
    let value = num / den * 100.0;
    value.is_finite().then_some(value)
}

/// Period-over-period change in percent: `(current - prior) / prior * 100`.
pub fn pct_change(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
    let cur = current?;
    let prev = prior?;
    if prev == 0.0 {
        return None;
    }
    let value = (cur - prev) / prev * 100.0;
    value.is_finite().then_some(value)
}

/// Change against a base expressed as `(current / base - 1) * 100`.
pub fn relative_change(current: Option<f64>, base: Option<f64>) -> Option<f64> {
    let cur = current?;
    let b = base?;
    if b == 0.0 {
        return None;
    }
    let value = (cur / b - 1.0) * 100.0;
    value.is_finite().then_some(value)
}

/// Preview form used while choosing columns, e.g. `$394328.00M`.
pub fn format_millions(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${:.2}M", v / 1e6),
        None => "N/A".to_string(),
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v),
        None => "N/A".to_string(),
    }
}

pub fn format_decimal(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "N/A".to_string(),
    }
}

/// Two decimals with thousands separators, e.g. `-1,234,567.89`.
pub fn format_amount(value: Option<f64>) -> String {
    let Some(v) = value else {
        return "N/A".to_string();
    };

    let fixed = format!("{:.2}", v.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if v < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}
