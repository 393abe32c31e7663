/// Bytes per kilobyte as reported by `du -k`
pub const KB: u64 = 1024;

/// Convert a kilobyte count from the probe into bytes
pub fn kb_to_bytes(kb: u64) -> u64 {
    kb.saturating_mul(KB)
}

/// Convert bytes back into whole kilobytes
pub fn bytes_to_kb(bytes: u64) -> u64 {
    bytes / KB
}

/// Format bytes into human-readable string
pub fn format_size(bytes: u64) -> String {
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Rounded share of `total` that is in use, as a percent label ("42%")
pub fn usage_percent_label(free: u64, total: u64) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    let used = total.saturating_sub(free);
    let pct = (used as f64 * 100.0 / total as f64).round();
    format!("{}%", pct as u64)
}

/// Format a number with thousand separators (e.g., 1,234,567)
pub fn format_count(n: u64) -> String {
    if n < 1000 {
        return n.to_string();
    }

    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);

    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result
}
