//! Name sanitising and extension classification for exported files.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::Path};

pub const DEFAULT_VIDEO_EXTS: &[&str] =
    &[".mp4", ".mkv", ".avi", ".mov", ".webm", ".m4v"];
pub const DEFAULT_SUB_EXTS: &[&str] = &[".srt", ".ass", ".ssa", ".vtt", ".sub"];
pub const DEFAULT_IMG_EXTS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Separators plus the characters Windows refuses in file names.
static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[/\\:*?"<>|]"#).expect("static regex is valid")
});

/// Turn a drive title into a single path component.
pub fn safe_name(name: &str) -> String {
    let stripped = name.replace('\0', "");
    let cleaned = UNSAFE_CHARS.replace_all(stripped.trim(), "_");
    match cleaned.as_ref() {
        "" => "untitled".to_string(),
        // `.` and `..` would resolve to the current or parent directory.
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned.into_owned(),
    }
}

/// Lowercase, dot-prefixed extension. An explicit `file_ext` wins over the
/// one embedded in the title; no extension yields an empty string.
pub fn split_ext(title: &str, file_ext: Option<&str>) -> String {
    if let Some(ext) = file_ext.map(str::trim).filter(|ext| !ext.is_empty()) {
        let ext = ext.to_lowercase();
        return if ext.starts_with('.') {
            ext
        } else {
            format!(".{ext}")
        };
    }

    Path::new(title)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Parse a comma separated allow-list such as `"mkv, .MP4"`.
///
/// Returns `None` when the input is absent or contains no usable entries so
/// callers can fall back to [`DEFAULT_VIDEO_EXTS`].
pub fn parse_allowed_exts(raw: Option<&str>) -> Option<BTreeSet<String>> {
    let raw = raw?;
    let exts: BTreeSet<String> = raw
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.starts_with('.') {
                part
            } else {
                format!(".{part}")
            }
        })
        .collect();

    if exts.is_empty() { None } else { Some(exts) }
}

/// Why a file makes it into the export view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportClass {
    Video,
    Subtitle,
    Image,
}

impl ExportClass {
    /// Classify an extension. `allowed` replaces the default video set when
    /// present; subtitles are always exported and images only on request.
    pub fn classify(
        ext: &str,
        allowed: Option<&BTreeSet<String>>,
        include_images: bool,
    ) -> Option<Self> {
        let is_video = match allowed {
            Some(set) => set.contains(ext),
            None => DEFAULT_VIDEO_EXTS.contains(&ext),
        };

        if is_video {
            Some(ExportClass::Video)
        } else if DEFAULT_SUB_EXTS.contains(&ext) {
            Some(ExportClass::Subtitle)
        } else if include_images && DEFAULT_IMG_EXTS.contains(&ext) {
            Some(ExportClass::Image)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_name_replaces_reserved_characters() {
        assert_eq!(safe_name("  AC/DC: Live?  "), "AC_DC_ Live_");
        assert_eq!(safe_name("a\0b"), "ab");
        assert_eq!(safe_name(r#"x\y*z"<>|"#), "x_y_z____");
    }

    #[test]
    fn safe_name_never_returns_empty() {
        assert_eq!(safe_name(""), "untitled");
        assert_eq!(safe_name("   "), "untitled");
        assert_eq!(safe_name("\0"), "untitled");
    }

    #[test]
    fn safe_name_neutralises_dot_components() {
        assert_eq!(safe_name(".."), "__");
        assert_eq!(safe_name(" . "), "_");
        assert_eq!(safe_name("../.."), ".._..");
        assert_eq!(safe_name("...And Justice"), "...And Justice");
    }

    #[test]
    fn split_ext_prefers_explicit_extension() {
        assert_eq!(split_ext("Movie.mkv", Some("MP4")), ".mp4");
        assert_eq!(split_ext("Movie.mkv", Some(".Srt")), ".srt");
        assert_eq!(split_ext("Movie.MKV", None), ".mkv");
        assert_eq!(split_ext("Movie.MKV", Some("  ")), ".mkv");
        assert_eq!(split_ext("README", None), "");
        assert_eq!(split_ext(".hidden", None), "");
    }

    #[test]
    fn parse_allowed_exts_normalises_entries() {
        let parsed = parse_allowed_exts(Some(" mkv, .MP4 ,,ts")).unwrap();
        let expected: BTreeSet<String> = [".mkv", ".mp4", ".ts"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(parsed, expected);

        assert!(parse_allowed_exts(None).is_none());
        assert!(parse_allowed_exts(Some("")).is_none());
        assert!(parse_allowed_exts(Some(" , ,")).is_none());
    }

    #[test]
    fn classify_respects_allow_list_and_image_flag() {
        assert_eq!(
            ExportClass::classify(".mkv", None, false),
            Some(ExportClass::Video)
        );
        assert_eq!(
            ExportClass::classify(".srt", None, false),
            Some(ExportClass::Subtitle)
        );
        assert_eq!(ExportClass::classify(".jpg", None, false), None);
        assert_eq!(
            ExportClass::classify(".jpg", None, true),
            Some(ExportClass::Image)
        );

        let only_ts = parse_allowed_exts(Some("ts"));
        assert_eq!(ExportClass::classify(".mkv", only_ts.as_ref(), false), None);
        assert_eq!(
            ExportClass::classify(".ts", only_ts.as_ref(), false),
            Some(ExportClass::Video)
        );
        assert_eq!(ExportClass::classify(".nfo", None, true), None);
    }
}
