const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formate un volume en octets en unité lisible (base 1024, 2 décimales max)
pub fn format_bytes(bytes: f64) -> String {
    if bytes <= 0.0 || !bytes.is_finite() {
        return "0 B".to_string();
    }

    let exp = (bytes.ln() / 1024f64.ln()).floor().clamp(0.0, (UNITS.len() - 1) as f64) as usize;
    let scaled = bytes / 1024f64.powi(exp as i32);
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exp])
}
