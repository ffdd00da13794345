//! Compact rendering helpers for status lines and published lists.

/// Comma-joined behavior names as published on the bus; `"none"` if empty.
pub fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(",")
    }
}

/// Config warnings folded into one line for an error message. Each is cut
/// at a word boundary to `max_chars`; those past `max_items` are counted.
pub fn warning_digest(warnings: &[String], max_items: usize, max_chars: usize) -> String {
    let mut digest = String::new();
    for w in warnings.iter().take(max_items) {
        if !digest.is_empty() {
            digest.push_str("; ");
        }
        digest.push_str(&clip_words(w, max_chars));
    }
    let hidden = warnings.len().saturating_sub(max_items);
    if hidden > 0 {
        digest.push_str(&format!(" [{} more]", hidden));
    }
    digest
}

/// Whole words of `text` fitting in `max_chars`, single-spaced. A word
/// longer than the limit on its own is cut mid-word.
fn clip_words(text: &str, max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for word in text.split_whitespace() {
        let gap = usize::from(used > 0);
        let len = word.chars().count();
        if used + gap + len > max_chars {
            if used == 0 {
                out.extend(word.chars().take(max_chars));
            }
            out.push_str("...");
            return out;
        }
        if gap == 1 {
            out.push(' ');
        }
        out.push_str(word);
        used += gap + len;
    }
    out
}

/// Decision value as published: integers without a fraction, otherwise up
/// to four decimals with trailing zeros trimmed.
pub fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{}", v as i64);
    }
    let s = format!("{:.4}", v);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
