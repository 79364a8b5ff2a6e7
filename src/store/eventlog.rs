//! PC-011: Append-only JSONL build log, `<cache_dir>/events.jsonl`.

use crate::core::types::{BuildEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current UTC time as ISO 8601, second precision.
pub fn now_iso8601() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_timestamp(secs)
}

fn format_timestamp(secs: u64) -> String {
    let (y, m, d) = civil_from_days((secs / 86400) as i64);
    let rem = secs % 86400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}

pub fn event_log_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("events.jsonl")
}

/// Append one event to the cache's build log.
pub fn append_event(cache_dir: &Path, event: BuildEvent) -> Result<(), String> {
    std::fs::create_dir_all(cache_dir)
        .map_err(|e| format!("cannot create cache dir {}: {}", cache_dir.display(), e))?;
    let path = event_log_path(cache_dir);

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;
    Ok(())
}

/// Read every event back, skipping lines that do not parse.
pub fn read_events(cache_dir: &Path) -> Result<Vec<TimestampedEvent>, String> {
    let path = event_log_path(cache_dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(format!("cannot read event log {}: {}", path.display(), e)),
    };
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pc011_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_timestamp(951_782_400), "2000-02-29T00:00:00Z");
        assert_eq!(format_timestamp(1_704_067_199), "2023-12-31T23:59:59Z");
    }

    #[test]
    fn test_pc011_civil_from_days_leap_rules() {
        // 1900 is not a leap year, so day 59 of 1900 is March 1st.
        let mar_1900 = -25_508;
        assert_eq!(civil_from_days(mar_1900), (1900, 3, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
    }

    #[test]
    fn test_pc011_now_iso8601_shape() {
        let ts = now_iso8601();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_pc011_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        append_event(
            &cache,
            BuildEvent::BuildStarted {
                key: "0123456789abcdef".into(),
                path: "/c/0123456789abcdef".into(),
                source: "a.pc:1:1".into(),
            },
        )
        .unwrap();
        append_event(
            &cache,
            BuildEvent::BuildCompleted {
                key: "0123456789abcdef".into(),
                path: "/c/0123456789abcdef".into(),
                duration_seconds: 0.5,
                content_hash: Some("blake3:00".into()),
            },
        )
        .unwrap();

        let content = std::fs::read_to_string(event_log_path(&cache)).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"event\":\"build_started\""));

        let events = read_events(&cache).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1].event, BuildEvent::BuildCompleted { .. }));
    }

    #[test]
    fn test_pc011_read_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_events(dir.path()).unwrap().is_empty());
    }
}
