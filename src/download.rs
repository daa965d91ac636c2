use crate::cancel::CancellationToken;
use crate::query::{self, Query};
use crate::ratio::{self, AspectRatioTarget};
use crate::Result;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use url::Url;

/// Stored artifacts are always re-encoded into this container.
pub const TARGET_IMAGE_EXT: &str = "webp";

/// Outcome of processing one candidate URL. `Skipped` is an expected
/// filtering result, `Failed` is a per-candidate defect; neither aborts
/// the surrounding run.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Stored(PathBuf),
    Skipped(SkipReason),
    Failed(FailReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Canceled,
    RatioMismatch,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailReason {
    Status(u16),
    Timeout,
    Transport(String),
    NotImage,
    Decode,
    Write(String),
}

impl DownloadOutcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            DownloadOutcome::Stored(_) => "stored",
            DownloadOutcome::Skipped(SkipReason::Canceled) => "skipped_canceled",
            DownloadOutcome::Skipped(SkipReason::RatioMismatch) => "skipped_ratio_mismatch",
            DownloadOutcome::Skipped(SkipReason::Duplicate) => "skipped_duplicate",
            DownloadOutcome::Failed(FailReason::Status(_)) => "failed_status",
            DownloadOutcome::Failed(FailReason::Timeout) => "failed_timeout",
            DownloadOutcome::Failed(FailReason::Transport(_)) => "failed_transport",
            DownloadOutcome::Failed(FailReason::NotImage) => "failed_not_image",
            DownloadOutcome::Failed(FailReason::Decode) => "failed_decode",
            DownloadOutcome::Failed(FailReason::Write(_)) => "failed_write",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            DownloadOutcome::Stored(path) => path.to_string_lossy().to_string(),
            DownloadOutcome::Skipped(_) => String::new(),
            DownloadOutcome::Failed(FailReason::Status(code)) => code.to_string(),
            DownloadOutcome::Failed(FailReason::Transport(message)) => message.clone(),
            DownloadOutcome::Failed(FailReason::Write(message)) => message.clone(),
            DownloadOutcome::Failed(_) => String::new(),
        }
    }
}

/// Fetch one candidate, validate it, and store it as WebP in `folder`.
/// Every step is a possible exit point; the only side effect is the final
/// atomic write, and an existing destination is never overwritten.
pub fn process_candidate(
    agent: &ureq::Agent,
    url: &str,
    folder: &Path,
    query: &Query,
    target: &AspectRatioTarget,
    tolerance: f64,
    token: &CancellationToken,
) -> DownloadOutcome {
    if token.is_canceled() {
        return DownloadOutcome::Skipped(SkipReason::Canceled);
    }

    let mut response = match agent.get(url).call() {
        Ok(response) => response,
        Err(err) => return DownloadOutcome::Failed(fetch_error_to_fail(err)),
    };

    let status = response.status().as_u16();
    if status != 200 {
        return DownloadOutcome::Failed(FailReason::Status(status));
    }

    let content_type = header_string(&response, "content-type");
    if !content_type.contains("image") {
        return DownloadOutcome::Failed(FailReason::NotImage);
    }

    let mut data = Vec::new();
    if let Err(err) = response.body_mut().as_reader().read_to_end(&mut data) {
        return DownloadOutcome::Failed(io_error_to_fail(err));
    }

    let decoded = match image::load_from_memory(&data) {
        Ok(decoded) => decoded,
        Err(_) => return DownloadOutcome::Failed(FailReason::Decode),
    };

    if !ratio::matches(decoded.width(), decoded.height(), target, tolerance) {
        return DownloadOutcome::Skipped(SkipReason::RatioMismatch);
    }

    let destination = folder.join(derive_file_name(url, query, folder));
    if destination.exists() {
        return DownloadOutcome::Skipped(SkipReason::Duplicate);
    }

    match write_webp_atomic(&decoded, &destination) {
        Ok(()) => DownloadOutcome::Stored(destination),
        Err(err) => DownloadOutcome::Failed(FailReason::Write(err.to_string())),
    }
}

/// First non-empty name wins: the sanitized final URL path segment with
/// its extension replaced, then a query-prefixed sequential name.
pub fn derive_file_name(url: &str, query: &Query, folder: &Path) -> String {
    url_file_stem(url)
        .map(|stem| format!("{stem}.{TARGET_IMAGE_EXT}"))
        .unwrap_or_else(|| {
            format!(
                "{}{}.{TARGET_IMAGE_EXT}",
                query.sanitized(),
                query::next_sequence_number(folder)
            )
        })
}

fn url_file_stem(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())?;
    let stem = Path::new(segment)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())?;
    let stripped = query::strip_path_hostile(&stem);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

fn write_webp_atomic(decoded: &DynamicImage, destination: &Path) -> Result<()> {
    // The WebP encoder only takes 8-bit RGB/RGBA buffers.
    let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());
    let mut encoded = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut encoded), ImageFormat::WebP)?;

    let tmp_path = destination.with_extension("tmp");
    std::fs::write(&tmp_path, &encoded)?;
    std::fs::rename(&tmp_path, destination)?;
    Ok(())
}

fn fetch_error_to_fail(err: ureq::Error) -> FailReason {
    match err {
        ureq::Error::Timeout(_) => FailReason::Timeout,
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => FailReason::Timeout,
        other => FailReason::Transport(other.to_string()),
    }
}

fn io_error_to_fail(err: std::io::Error) -> FailReason {
    if err.kind() == std::io::ErrorKind::TimedOut {
        FailReason::Timeout
    } else {
        FailReason::Transport(err.to_string())
    }
}

fn header_string(response: &ureq::http::Response<ureq::Body>, key: &str) -> String {
    response
        .headers()
        .get(key)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(text: &str) -> Query {
        Query::normalize(text).expect("query")
    }

    #[test]
    fn file_name_comes_from_the_url_basename_with_the_extension_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let name = derive_file_name(
            "https://cdn.example.com/photos/2024/sunset.jpeg?size=large",
            &query("cats"),
            dir.path(),
        );
        assert_eq!(name, "sunset.webp");
    }

    #[test]
    fn file_name_strips_path_hostile_characters_from_the_basename() {
        let dir = tempfile::tempdir().expect("tempdir");
        let name = derive_file_name(
            "https://cdn.example.com/img/what%3F*is|this.png",
            &query("cats"),
            dir.path(),
        );
        assert_eq!(name, "what%3Fisthis.webp");
    }

    #[test]
    fn file_name_falls_back_to_query_plus_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("cats4.webp"), b"x").expect("write");

        let name = derive_file_name("https://cdn.example.com/", &query("cats"), dir.path());
        assert_eq!(name, "cats5.webp");

        // A basename that sanitizes to nothing lands in the same tier.
        let name = derive_file_name("https://cdn.example.com/a/***", &query("cats"), dir.path());
        assert_eq!(name, "cats5.webp");
    }

    #[test]
    fn write_webp_atomic_leaves_a_decodable_file_and_no_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let destination = dir.path().join("pic.webp");
        let source = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            8,
            6,
            image::Rgba([200, 100, 50, 255]),
        ));

        write_webp_atomic(&source, &destination).expect("write");
        assert!(destination.is_file());
        assert!(!dir.path().join("pic.tmp").exists());

        let reloaded = image::open(&destination).expect("reload");
        assert_eq!((reloaded.width(), reloaded.height()), (8, 6));
    }
}
