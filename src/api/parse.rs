//! Lenient text-to-number parsing for form-style input.
//!
//! A value is read from its longest numeric prefix, so `"12abc"` is 12 and
//! `"abc"` is nothing. Callers decide what "nothing" falls back to.

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn sign_len(bytes: &[u8]) -> usize {
    usize::from(matches!(bytes.first(), Some(b'+' | b'-')))
}

/// Decimal prefix with optional fraction and exponent. Never yields NaN or
/// an infinity.
pub fn parse_amount(text: &str) -> Option<f64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();

    let mut end = sign_len(bytes);
    let int_digits = count_digits(&bytes[end..]);
    end += int_digits;

    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = count_digits(&bytes[end + 1..]);
        if int_digits > 0 || frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let exp_start = end + 1;
        let exp_sign = sign_len(&bytes[exp_start..]);
        let exp_digits = count_digits(&bytes[exp_start + exp_sign..]);
        if exp_digits > 0 {
            end = exp_start + exp_sign + exp_digits;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer prefix; `"12.7"` is 12. Prefixes too long for `i64` saturate.
pub fn parse_whole(text: &str) -> Option<i64> {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let sign = sign_len(bytes);
    let digits = count_digits(&bytes[sign..]);
    if digits == 0 {
        return None;
    }
    let saturated = if bytes[0] == b'-' { i64::MIN } else { i64::MAX };
    Some(s[..sign + digits].parse::<i64>().unwrap_or(saturated))
}
