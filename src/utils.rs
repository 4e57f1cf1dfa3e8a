//! Utility functions for naming, formatting and atomic file writes

use crate::error::Result;
use crate::types::Platform;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Maximum characters kept from each filename descriptor
const MAX_DESCRIPTOR_LEN: usize = 15;

/// Number of descriptors in a stub
const DESCRIPTOR_COUNT: usize = 3;

/// Descriptor used when the input name yields none
const FALLBACK_DESCRIPTOR: &str = "clip";

/// Timestamp layout shared by batch ids and stubs
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Batch identifier for a run started at `at`
pub fn batch_id(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Up to three lowercase descriptors taken from the input's file stem
///
/// Words are split on anything that is not ASCII alphanumeric. Purely numeric
/// words (dates, counters) are skipped and each word is cut to 15 characters.
pub fn descriptors(input_ref: &str) -> Vec<String> {
    let name = input_ref
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(input_ref);
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);

    stem.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
        .map(|w| {
            w.to_ascii_lowercase()
                .chars()
                .take(MAX_DESCRIPTOR_LEN)
                .collect::<String>()
        })
        .take(DESCRIPTOR_COUNT)
        .collect()
}

/// Deterministic artifact base name
///
/// Format: `{d1}_{d2}_{d3}_{platform}_{YYYYMMDD_HHMMSS}_{index:03}`. Fewer
/// descriptors are used when the input name has fewer words. The batch index
/// keeps stubs unique when two inputs share a name and timestamp.
///
/// # Examples
///
/// ```
/// use genbatch::utils::target_stub;
/// use genbatch::types::Platform;
/// use chrono::{TimeZone, Utc};
///
/// let at = Utc.with_ymd_and_hms(2025, 6, 17, 15, 30, 12).unwrap();
/// let stub = target_stub("images/rolex_oyster_gold_watch.png", Platform::Ig, at, 0);
/// assert_eq!(stub, "rolex_oyster_gold_ig_20250617_153012_000");
/// ```
pub fn target_stub(
    input_ref: &str,
    platform: Platform,
    submitted_at: DateTime<Utc>,
    index: usize,
) -> String {
    let mut words = descriptors(input_ref);
    if words.is_empty() {
        words.push(FALLBACK_DESCRIPTOR.to_string());
    }
    format!(
        "{}_{}_{}_{:03}",
        words.join("_"),
        platform.tag(),
        submitted_at.format(TIMESTAMP_FORMAT),
        index
    )
}

/// File extension of an artifact URL, or `default` when it has none
pub fn artifact_extension(url: &str, default: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url)
        && let Some(mut segments) = parsed.path_segments()
        && let Some(last) = segments.next_back()
        && let Some(ext) = Path::new(last).extension().and_then(|e| e.to_str())
        && !ext.is_empty()
        && ext.len() <= 5
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return ext.to_ascii_lowercase();
    }
    default.trim_start_matches('.').to_string()
}

/// Human-readable duration, e.g. `45.2s`, `1m 5.0s`, `1h 2m 3.0s`
pub fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        format!("{}m {:.1}s", minutes as u64, seconds - minutes * 60.0)
    } else {
        let hours = (seconds / 3600.0).floor();
        let rest = seconds - hours * 3600.0;
        let minutes = (rest / 60.0).floor();
        format!(
            "{}h {}m {:.1}s",
            hours as u64,
            minutes as u64,
            rest - minutes * 60.0
        )
    }
}

/// Size in megabytes, rounded to two decimals
pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it
///
/// The data is written to a sibling temporary file, synced, then renamed over
/// the destination so readers never observe a partial file.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_sibling(path);
    {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Batch id encoded in a queue file name (`task_queue_{batch_id}.json`)
pub fn batch_id_from_queue_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let id = name.strip_prefix("task_queue_")?.strip_suffix(".json")?;
    (!id.is_empty()).then(|| id.to_string())
}

/// Most recently modified queue file in `state_dir`
pub fn latest_queue_file(state_dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(state_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if batch_id_from_queue_path(&path).is_none() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        // Ties resolve by name so identical mtimes still pick the later batch
        let newer = match &newest {
            None => true,
            Some((t, p)) => modified > *t || (modified == *t && path > *p),
        };
        if newer {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, p)| p))
}
