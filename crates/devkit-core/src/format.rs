use chrono::{DateTime, Utc};

/// Render a number of seconds as `45s`, `2m 05s` or `1h 02m 03s`.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Sub-minute precision for short tool runs: `850ms`, `4.2s`, `1m 3.5s`.
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", elapsed.as_millis())
    } else if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let minutes = elapsed.as_secs() / 60;
        format!("{minutes}m {:.1}s", secs - (minutes * 60) as f64)
    }
}

/// Time elapsed between `since` and `now`, clamped at zero for clock skew.
pub fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_seconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn seconds_only() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(45), "45s");
    }

    #[test]
    fn minutes_pad_seconds() {
        assert_eq!(format_duration(125), "2m 05s");
        assert_eq!(format_duration(600), "10m 00s");
    }

    #[test]
    fn hours_pad_minutes_and_seconds() {
        assert_eq!(format_duration(3723), "1h 02m 03s");
    }

    #[test]
    fn elapsed_tool_runs() {
        use std::time::Duration as Std;
        assert_eq!(format_elapsed(Std::from_millis(850)), "850ms");
        assert_eq!(format_elapsed(Std::from_millis(4_200)), "4.2s");
        assert_eq!(format_elapsed(Std::from_millis(63_500)), "1m 3.5s");
    }

    #[test]
    fn elapsed_never_negative() {
        let now = Utc::now();
        assert_eq!(elapsed_secs(now + Duration::seconds(5), now), 0);
        assert_eq!(elapsed_secs(now - Duration::seconds(90), now), 90);
    }
}
