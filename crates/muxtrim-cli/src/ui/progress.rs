//! Progress text formatting.

const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

/// Human-readable byte count with binary units.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// `current / total (pct%)`, or just `current` when the total is unknown.
pub fn format_progress(current: u64, total: Option<u64>) -> String {
    match total.filter(|&t| t > 0) {
        Some(total) => {
            let pct = (current.min(total) * 100) / total;
            format!(
                "{} / {} ({pct}%)",
                format_bytes(current),
                format_bytes(total)
            )
        }
        None => format_bytes(current),
    }
}
