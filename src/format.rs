/// Format a USD amount rounded to whole dollars, e.g. `$1,600,584`.
pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return "$0".to_string();
    }

    let rounded = value.round();
    // No integer cast: balances can exceed u64::MAX.
    let dollars_str = format!("{:.0}", rounded.abs());
    let mut result = String::with_capacity(dollars_str.len() + dollars_str.len() / 3);
    for (i, c) in dollars_str.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    let dollars_formatted: String = result.chars().rev().collect();

    if rounded < 0.0 {
        format!("-${dollars_formatted}")
    } else {
        format!("${dollars_formatted}")
    }
}

/// Format a value already expressed in percent.
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_has_thousands_separators_and_no_cents() {
        assert_eq!(format_currency(1_600_583.75), "$1,600,584");
        assert_eq!(format_currency(64_023.35), "$64,023");
        assert_eq!(format_currency(999.49), "$999");
        assert_eq!(format_currency(1_000.0), "$1,000");
        assert_eq!(format_currency(0.0), "$0");
    }

    #[test]
    fn currency_prints_balances_beyond_integer_range() {
        assert_eq!(format_currency(2e19), "$20,000,000,000,000,000,000");
        assert_eq!(
            format_currency(1e21),
            "$1,000,000,000,000,000,000,000"
        );
        let huge = format_currency(1.2676506002282294e42);
        assert!(huge.starts_with("$1,267,650,600,228,229"), "{huge}");
        assert_eq!(huge.len(), "$".len() + 43 + 14);
    }

    #[test]
    fn currency_handles_negative_and_non_finite_values() {
        assert_eq!(format_currency(-12_345.6), "-$12,346");
        assert_eq!(format_currency(-0.2), "$0");
        assert_eq!(format_currency(f64::NAN), "$0");
        assert_eq!(format_currency(f64::INFINITY), "$0");
    }

    #[test]
    fn percent_uses_requested_precision() {
        assert_eq!(format_percent(6.796_116, 2), "6.80%");
        assert_eq!(format_percent(2.56, 1), "2.6%");
    }
}
