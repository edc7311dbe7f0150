//! Human-readable labels for sizes, timestamps, and file kinds.

use time::{Duration, OffsetDateTime};

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Format a byte count as `0 Bytes`, `512 Bytes`, `1.5 KB`, `10 MB`, ...
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit + 1 < SIZE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    // Trailing zeros are dropped: 10.00 -> 10, 1.50 -> 1.5.
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{text} {}", SIZE_UNITS[unit])
}

/// Relative label for a message timestamp as seen at `now`.
pub fn format_time(timestamp: OffsetDateTime, now: OffsetDateTime) -> String {
    let diff = now - timestamp;
    if diff < Duration::minutes(1) {
        "Just now".to_string()
    } else if diff < Duration::hours(1) {
        format!("{}m ago", diff.whole_minutes())
    } else if diff < Duration::days(1) {
        format!("{}h ago", diff.whole_hours())
    } else {
        let date = timestamp.date();
        format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    }
}

/// Broad category of a file, used to pick an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Raster or vector images.
    Image,
    /// Documents and plain text.
    Document,
    /// Source code.
    Code,
    /// Anything else.
    File,
}

impl FileKind {
    /// A short glyph for terminal display.
    pub fn icon(self) -> &'static str {
        match self {
            FileKind::Image => "[img]",
            FileKind::Document => "[doc]",
            FileKind::Code => "[code]",
            FileKind::File => "[file]",
        }
    }
}

fn extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Classify a file by its extension.
pub fn file_kind(filename: &str) -> FileKind {
    match extension(filename).as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" => FileKind::Image,
        "pdf" | "doc" | "docx" | "txt" | "rtf" => FileKind::Document,
        "js" | "html" | "css" | "json" | "xml" | "py" | "java" | "cpp" => FileKind::Code,
        _ => FileKind::File,
    }
}

/// Guess a MIME type from the file extension; unknown extensions are
/// `application/octet-stream`.
pub fn guess_mime_type(filename: &str) -> &'static str {
    match extension(filename).as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "exe" => "application/x-msdownload",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
