use std::time::Duration;

/// Human readable duration: `1d 2h 3m 4s`, zero units omitted, `0s` for nothing.
pub fn get_readable_time(d: Duration) -> String {
    const PERIODS: [(&str, u64); 4] = [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)];

    let mut seconds = d.as_secs();
    let mut parts = Vec::new();
    for (name, len) in PERIODS {
        if seconds >= len {
            parts.push(format!("{}{name}", seconds / len));
            seconds %= len;
        }
    }
    if parts.is_empty() {
        return "0s".to_string();
    }
    parts.join(" ")
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
