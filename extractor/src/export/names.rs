use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

fn fmt_ts(ms: i64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(Utc::now);
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Keep names portable across filesystems.
fn sanitize(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

/// Directory for one run.
/// e.g. "keynote_20260218T093000Z"
pub fn run_dir_name(stem: &str, now_ms: i64) -> String {
    format!("{}_{}", sanitize(stem), fmt_ts(now_ms))
}

/// File name for the `index`-th retained slide (1-based).
/// e.g. "slide_0003_01m23.450s.jpg", or "slide_0003.jpg" without a timestamp.
pub fn slide_file_name(index: usize, pts: Option<Duration>, ext: &str) -> String {
    match pts {
        Some(t) => {
            let ms = t.as_millis();
            format!(
                "slide_{index:04}_{m:02}m{s:02}.{frac:03}s.{ext}",
                m = ms / 60_000,
                s = (ms / 1000) % 60,
                frac = ms % 1000,
            )
        }
        None => format!("slide_{index:04}.{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_dir_format() {
        // 2026-02-18T09:30:00.000Z
        let k = run_dir_name("keynote", 1771407000000);
        assert_eq!(k, "keynote_20260218T093000Z");
    }

    #[test]
    fn run_dir_sanitizes_stem() {
        let k = run_dir_name("My Talk: part/2", 0);
        assert!(k.starts_with("My_Talk__part_2_"));
        assert!(run_dir_name("", 0).starts_with("video_"));
    }

    #[test]
    fn slide_names_sort_in_order() {
        assert_eq!(
            slide_file_name(3, Some(Duration::from_millis(83_450)), "jpg"),
            "slide_0003_01m23.450s.jpg"
        );
        assert_eq!(slide_file_name(12, None, "png"), "slide_0012.png");

        let a = slide_file_name(9, Some(Duration::from_secs(5)), "jpg");
        let b = slide_file_name(10, Some(Duration::from_secs(4000)), "jpg");
        assert!(a < b);
    }
}
