// src/utils/format.rs

/// Rounds to one decimal place, the precision every rate in the API uses.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole * 100`, rounded to one decimal. Zero when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole > 0 {
        round1(part as f64 / whole as f64 * 100.0)
    } else {
        0.0
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when something was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// `"{m}m {s}s"`; `None` for missing or zero durations.
pub fn format_duration(seconds: Option<i64>) -> Option<String> {
    match seconds {
        Some(secs) if secs > 0 => Some(format!("{}m {}s", secs / 60, secs % 60)),
        _ => None,
    }
}

/// Python-style title casing: a letter is upper-cased when it does not follow
/// another letter, and lower-cased otherwise.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_is_letter = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}
