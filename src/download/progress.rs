/// Formats a byte count with 1024-based K/M/G prefixes, two decimals at most
pub fn human_readable_filesize(size: f64) -> String {
    const PREFIXES: [&str; 4] = ["", "K", "M", "G"];
    const UNIT: f64 = 1024.0;

    let mut size = size;
    let mut i = 0;
    while size > UNIT && i < PREFIXES.len() - 1 {
        i += 1;
        size /= UNIT;
    }

    let rounded = (size * 100.0).round() / 100.0;
    format!("{}{}", rounded, PREFIXES[i])
}

/// One-line progress snippet: `" 42%: 1234 / 2938 @ 1.2MBps"`
pub fn visualize_progress(percent: u8, downloaded: u64, total: u64, speed: u64) -> String {
    let s_total = total.to_string();
    format!(
        "{:>3}%: {:>width$} / {} @ {}Bps",
        percent,
        downloaded,
        s_total,
        human_readable_filesize(speed as f64),
        width = s_total.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_binary_prefixes() {
        assert_eq!(human_readable_filesize(512.0), "512");
        assert_eq!(human_readable_filesize(1536.0), "1.5K");
        assert_eq!(human_readable_filesize(5.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0), "5120G");
    }

    #[test]
    fn snippet_pads_downloaded_to_total_width() {
        assert_eq!(visualize_progress(5, 42, 1000, 42), "  5%:   42 / 1000 @ 42Bps");
    }
}
