//! MIME type lookup
//!
//! Maps a file extension to a Content-Type for file-backed responses.

use std::path::Path;

/// Content-Type used when the extension is unknown
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Get MIME Content-Type based on file extension (case-insensitive)
///
/// # Examples
/// ```
/// use tinyserve::http::mime::content_type;
/// assert_eq!(content_type(Some("html")), "text/html; charset=utf-8");
/// assert_eq!(content_type(Some("MP4")), "video/mp4");
/// assert_eq!(content_type(None), "application/octet-stream");
/// ```
pub fn content_type(extension: Option<&str>) -> &'static str {
    let Some(extension) = extension else {
        return DEFAULT_CONTENT_TYPE;
    };

    match extension.to_ascii_lowercase().as_str() {
        // Text
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "txt" | "md" => "text/plain; charset=utf-8",
        "csv" => "text/csv",
        "xml" => "application/xml",

        // JavaScript/WASM
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "wasm" => "application/wasm",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",

        // Video
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "ts" => "video/mp2t",
        "m3u8" => "application/vnd.apple.mpegurl",

        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",

        // Fonts
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",

        // Documents
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "gzip" => "application/gzip",

        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Content-Type for a file path
pub fn content_type_for_path(path: &Path) -> &'static str {
    content_type(path.extension().and_then(|e| e.to_str()))
}
