//! Inlining of local images as `data:` URLs.
//!
//! The rendered page is handed to the display sink as a string, so relative
//! image paths have nothing to resolve against. Local images are read and
//! embedded into the `src` attribute instead.

use crate::error::PreviewError;
use base64::Engine;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<img\s(?:[^>]*?\s)?src="([^"]*)""#).unwrap());

/// Returns the MIME type for an image file, by extension (case-insensitive).
///
/// Unknown extensions fall back to `image/png`.
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

fn is_external(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://") || src.starts_with("data:")
}

/// Reverts the attribute escaping done by the renderer.
fn unescape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

/// Resolves an image `src` attribute to a file system path.
fn resolve_image_path(src: &str, base_dir: &Path) -> PathBuf {
    let unescaped = unescape_attribute(src);
    let decoded = percent_decode_str(&unescaped).decode_utf8_lossy();
    let path = Path::new(decoded.as_ref());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn to_data_url(path: PathBuf) -> Result<String, PreviewError> {
    let bytes = std::fs::read(&path).map_err(|source| PreviewError::ImageUnreadable {
        path: path.clone(),
        source,
    })?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{encoded}", mime_type(&path)))
}

/// Rewrites the `src` of every local `<img>` in `fragment` to a `data:` URL.
///
/// Remote (`http://`, `https://`) and already inlined (`data:`) sources are
/// left alone, as are images that cannot be read.
///
/// # Example
///
/// ```
/// use livemd_core::images::inline_images;
/// use std::path::Path;
///
/// let html = r#"<img src="https://example.com/logo.png">"#;
/// assert_eq!(inline_images(html, Path::new("/docs")), html);
/// ```
pub fn inline_images(fragment: &str, base_dir: &Path) -> String {
    let sources: Vec<_> = IMG_SRC
        .captures_iter(fragment)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.range())
        .collect();

    let mut html = fragment.to_string();

    // Back to front, so the ranges not yet visited stay valid.
    for range in sources.into_iter().rev() {
        let src = &fragment[range.clone()];
        if src.is_empty() || is_external(src) {
            continue;
        }

        match to_data_url(resolve_image_path(src, base_dir)) {
            Ok(data_url) => html.replace_range(range, &data_url),
            Err(err) => {
                tracing::debug!(%err, src, "Leaving image reference unchanged");
            }
        }
    }

    html
}
