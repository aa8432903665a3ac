//! File naming conventions for generated artifacts and staged uploads.
//!
//! Artifacts are named deterministically from the task that produced them
//! so the output directory can be inspected without the database.

use crate::types::{TaskId, Timestamp};

/// URL prefix under which the output directory is served.
pub const ARTIFACT_URL_PREFIX: &str = "/images";

/// Extension used when an upstream file name has none.
pub const DEFAULT_EXTENSION: &str = "png";

/// Split a file name into `(base, extension)` on the last dot.
///
/// Any directory component is discarded first. A name without a dot keeps
/// its whole text as the base and gets [`DEFAULT_EXTENSION`].
///
/// # Examples
///
/// ```
/// use batchgen_core::naming::split_file_name;
///
/// assert_eq!(split_file_name("ComfyUI_00001_.png"), ("ComfyUI_00001_", "png"));
/// assert_eq!(split_file_name("raw"), ("raw", "png"));
/// assert_eq!(split_file_name("sub/dir/a.b.webp"), ("a.b", "webp"));
/// ```
pub fn split_file_name(name: &str) -> (&str, &str) {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match name.rsplit_once('.') {
        Some((base, ext)) if !ext.is_empty() => (base, ext),
        Some((base, _)) => (base, DEFAULT_EXTENSION),
        None => (name, DEFAULT_EXTENSION),
    }
}

/// Generate the output file name for one artifact.
///
/// Convention: `{task_id}_{original_base}_{seq:02}.{ext}` where `seq` is the
/// 1-based position of the artifact in the backend's output list.
///
/// # Examples
///
/// ```
/// use batchgen_core::naming::artifact_filename;
///
/// let id = uuid::Uuid::nil();
/// assert_eq!(
///     artifact_filename(id, "ComfyUI_00001_.png", 1),
///     "00000000-0000-0000-0000-000000000000_ComfyUI_00001__01.png",
/// );
/// ```
pub fn artifact_filename(task_id: TaskId, original_name: &str, seq: usize) -> String {
    let (base, ext) = split_file_name(original_name);
    format!("{task_id}_{base}_{seq:02}.{ext}")
}

/// Public reference recorded on the task for a saved artifact.
pub fn artifact_url(filename: &str) -> String {
    format!("{ARTIFACT_URL_PREFIX}/{filename}")
}

/// Generate the staging file name for an uploaded input image.
///
/// Convention: `{unix_millis}.{ext}`, independent of any task.
pub fn staged_upload_filename(now: Timestamp, original_name: &str) -> String {
    let ext = match original_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    };
    format!("{}.{ext}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn sequence_is_zero_padded() {
        let id = uuid::Uuid::nil();
        let name = artifact_filename(id, "out.png", 3);
        assert!(name.ends_with("_out_03.png"), "got {name}");
    }

    #[test]
    fn sequence_beyond_two_digits_is_not_truncated() {
        let id = uuid::Uuid::nil();
        assert!(artifact_filename(id, "out.png", 120).ends_with("_out_120.png"));
    }

    #[test]
    fn extension_is_preserved() {
        let id = uuid::Uuid::nil();
        assert!(artifact_filename(id, "clip.webp", 1).ends_with(".webp"));
    }

    #[test]
    fn missing_extension_defaults_to_png() {
        assert_eq!(split_file_name("noext"), ("noext", "png"));
        assert_eq!(split_file_name("trailing."), ("trailing", "png"));
    }

    #[test]
    fn directory_components_are_dropped() {
        assert_eq!(split_file_name("../../etc/passwd"), ("passwd", "png"));
    }

    #[test]
    fn artifact_url_uses_prefix() {
        assert_eq!(artifact_url("a.png"), "/images/a.png");
    }

    #[test]
    fn staged_name_uses_millis_and_lowercase_ext() {
        let now = chrono::Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(staged_upload_filename(now, "Photo.JPG"), "1700000000123.jpg");
        assert_eq!(staged_upload_filename(now, "photo"), "1700000000123.png");
        assert_eq!(staged_upload_filename(now, "x.p/ng"), "1700000000123.png");
    }
}
