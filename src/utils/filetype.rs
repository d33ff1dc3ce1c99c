use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Coarse file category derived from the file extension alone.
/// This is a static lookup, not content sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Apk,
    Other,
}

const IMAGE_EXTS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif", "svg", "ico", "psd", "raw",
];

const VIDEO_EXTS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "flv", "wmv", "m4v", "mpg", "mpeg", "3gp", "webm", "ogg",
];

const AUDIO_EXTS: &[&str] = &[
    "mp3", "wav", "aac", "flac", "wma", "m4a", "ogg", "oga", "opus", "mid", "midi",
];

impl FileCategory {
    /// Classifies by extension (without the leading dot, case-insensitive).
    /// "ogg" appears in both the video and audio tables; video wins, matching
    /// the lookup order.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if ext == "apk" {
            return FileCategory::Apk;
        }
        if IMAGE_EXTS.contains(&ext.as_str()) {
            FileCategory::Image
        } else if VIDEO_EXTS.contains(&ext.as_str()) {
            FileCategory::Video
        } else if AUDIO_EXTS.contains(&ext.as_str()) {
            FileCategory::Audio
        } else {
            FileCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Video => "video",
            FileCategory::Audio => "audio",
            FileCategory::Apk => "apk",
            FileCategory::Other => "other",
        }
    }
}

/// Splits "report.final.pdf" into ("report.final", "pdf").
/// Returns `None` when the name carries no extension at all.
pub fn split_extension(file_name: &str) -> Option<(&str, &str)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some((stem, ext))
}

/// Human-readable size for log lines, e.g. "23.00 MB".
pub fn format_size(size: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = KB * 1024;
    const GB: i64 = MB * 1024;

    if size < KB {
        format!("{} B", size)
    } else if size < MB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else {
        format!("{:.2} GB", size as f64 / GB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension() {
        assert_eq!(FileCategory::from_extension("JPG"), FileCategory::Image);
        assert_eq!(FileCategory::from_extension("webm"), FileCategory::Video);
        assert_eq!(FileCategory::from_extension("flac"), FileCategory::Audio);
        assert_eq!(FileCategory::from_extension("apk"), FileCategory::Apk);
        assert_eq!(FileCategory::from_extension("pdf"), FileCategory::Other);
        // shared extension resolves to video
        assert_eq!(FileCategory::from_extension("ogg"), FileCategory::Video);
    }

    #[test]
    fn splits_extensions() {
        assert_eq!(split_extension("a.png"), Some(("a", "png")));
        assert_eq!(split_extension("archive.tar.gz"), Some(("archive.tar", "gz")));
        assert_eq!(split_extension("noext"), None);
        assert_eq!(split_extension("trailing."), None);
        // a leading dot still counts as an extension marker
        assert_eq!(split_extension(".bashrc"), Some(("", "bashrc")));
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(23 * 1024 * 1024), "23.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
