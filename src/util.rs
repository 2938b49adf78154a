pub fn format_duration(s: u32) -> String {
    let (h, m, s) = (s / (60 * 60), (s / 60) % 60, s % 60);
    if h > 0 {
        return format!("{h:02}:{m:02}:{s:02}");
    }
    format!("{m:02}:{s:02}")
}

#[cfg(test)]
mod tests {
    use super::format_duration;

    #[test]
    fn durations() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(59), "00:59");
        assert_eq!(format_duration(212), "03:32");
        assert_eq!(format_duration(3600), "01:00:00");
        assert_eq!(format_duration(3661), "01:01:01");
    }
}
