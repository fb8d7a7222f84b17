//! Extension based classification of uploads.
//!
//! Two mappings hang off the extension and they are kept apart on purpose:
//! the backend resource type (what Cloudinary calls `image`, `video` or
//! `raw`) and the display side (a `Content-Type` guess plus a human label).
//! Audio is where they disagree: Cloudinary files audio under `video`,
//! while the display label calls it audio. [`ResourceTypeMap`] makes the
//! backend side configurable.

use mime::Mime;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const IMAGE: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];
const VIDEO: &[&str] = &["mp4", "webm", "mov", "avi", "mkv", "wmv", "flv"];
const AUDIO: &[&str] = &["mp3", "wav", "ogg", "flac"];
const DOCUMENT: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx"];
const ARCHIVE: &[&str] = &["zip", "rar", "7z", "tar", "gz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    Image,
    AudioVideo,
    Document,
    Generic,
}

fn contains(set: &[&str], ext: &str) -> bool {
    set.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext))
}

/// First matching set wins: image, then audio/video, then document.
pub fn classify(extension: &str) -> ResourceCategory {
    if contains(IMAGE, extension) {
        ResourceCategory::Image
    } else if contains(VIDEO, extension) || contains(AUDIO, extension) {
        ResourceCategory::AudioVideo
    } else if contains(DOCUMENT, extension) {
        ResourceCategory::Document
    } else {
        ResourceCategory::Generic
    }
}

pub fn is_audio(extension: &str) -> bool {
    contains(AUDIO, extension)
}

/// Backend resource type as used in Cloudinary delivery paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type `{0}` (expected image, video or raw)")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(ResourceType::Image),
            "video" => Ok(ResourceType::Video),
            "raw" => Ok(ResourceType::Raw),
            _ => Err(UnknownResourceType(s.to_string())),
        }
    }
}

/// Category to backend resource type, with an explicit choice for audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTypeMap {
    pub audio: ResourceType,
}

impl Default for ResourceTypeMap {
    fn default() -> Self {
        Self {
            audio: ResourceType::Video,
        }
    }
}

impl ResourceTypeMap {
    pub fn resource_type(&self, extension: &str) -> ResourceType {
        match classify(extension) {
            ResourceCategory::Image => ResourceType::Image,
            ResourceCategory::AudioVideo if is_audio(extension) => self.audio,
            ResourceCategory::AudioVideo => ResourceType::Video,
            ResourceCategory::Document | ResourceCategory::Generic => ResourceType::Raw,
        }
    }
}

/// Display label for an upload, finer grained than [`ResourceCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    #[serde(rename = "PDF document")]
    Pdf,
    #[serde(rename = "Word document")]
    Word,
    Spreadsheet,
    Presentation,
    Archive,
    File,
}

impl MediaKind {
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => MediaKind::Pdf,
            "doc" | "docx" => MediaKind::Word,
            "xls" | "xlsx" => MediaKind::Spreadsheet,
            "ppt" | "pptx" => MediaKind::Presentation,
            _ if contains(IMAGE, &ext) => MediaKind::Image,
            _ if contains(VIDEO, &ext) => MediaKind::Video,
            _ if contains(AUDIO, &ext) => MediaKind::Audio,
            _ if contains(ARCHIVE, &ext) => MediaKind::Archive,
            _ => MediaKind::File,
        }
    }
}

/// `Content-Type` guessed from the extension alone.
pub fn guess_content_type(extension: &str) -> Mime {
    mime_guess::from_ext(extension).first_or_octet_stream()
}

/// Human readable size, the way the upload page prints it.
pub fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let n = bytes as f64;
    if n < KB {
        format!("{bytes} B")
    } else if n < MB {
        format!("{:.2} KB", n / KB)
    } else {
        format!("{:.2} MB", n / MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_ignores_case() {
        assert_eq!(classify("JPG"), classify("jpg"));
        assert_eq!(classify("Mp4"), ResourceCategory::AudioVideo);
        assert_eq!(classify("PDF"), ResourceCategory::Document);
    }

    #[test]
    fn unknown_extensions_fall_back_to_generic() {
        for ext in ["", "exe", "zip", "tar", "weird-ext", "日本"] {
            assert_eq!(classify(ext), ResourceCategory::Generic, "{ext}");
        }
    }

    #[test]
    fn classification_is_stable() {
        let first = classify("webp");
        for _ in 0..10 {
            assert_eq!(classify("webp"), first);
        }
    }

    #[test]
    fn audio_follows_the_configured_resource_type() {
        let default = ResourceTypeMap::default();
        assert_eq!(default.resource_type("mp3"), ResourceType::Video);
        assert_eq!(default.resource_type("mkv"), ResourceType::Video);

        let raw_audio = ResourceTypeMap {
            audio: ResourceType::Raw,
        };
        assert_eq!(raw_audio.resource_type("OGG"), ResourceType::Raw);
        assert_eq!(raw_audio.resource_type("mov"), ResourceType::Video);
    }

    #[test]
    fn documents_and_generic_files_are_raw() {
        let map = ResourceTypeMap::default();
        assert_eq!(map.resource_type("png"), ResourceType::Image);
        assert_eq!(map.resource_type("docx"), ResourceType::Raw);
        assert_eq!(map.resource_type("bin"), ResourceType::Raw);
    }

    #[test]
    fn display_kind_splits_audio_from_video() {
        assert_eq!(MediaKind::from_extension("wav"), MediaKind::Audio);
        assert_eq!(MediaKind::from_extension("webm"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("XLSX"), MediaKind::Spreadsheet);
        assert_eq!(MediaKind::from_extension("7z"), MediaKind::Archive);
        assert_eq!(MediaKind::from_extension(""), MediaKind::File);
    }

    #[test]
    fn resource_type_parses_leniently() {
        assert_eq!("Image".parse::<ResourceType>(), Ok(ResourceType::Image));
        assert_eq!(" raw ".parse::<ResourceType>(), Ok(ResourceType::Raw));
        assert!("audio".parse::<ResourceType>().is_err());
    }

    #[test]
    fn content_type_guess() {
        assert_eq!(guess_content_type("png"), mime::IMAGE_PNG);
        assert_eq!(guess_content_type("nope"), mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn sizes_format_like_the_upload_page() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024 + 512 * 1024), "3.50 MB");
    }
}
