//! Content negotiation for JSON responses.

use axum::http::{header::ACCEPT, HeaderMap};
use mime::Mime;

/// Whether the client will take a JSON representation.
///
/// The header is read as a single media type. A missing header, or one that
/// does not parse as exactly one type (including any comma-separated list),
/// is treated as `*/*`. Parameters such as `q` are ignored.
pub fn accepts_json(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(ACCEPT) else {
        return true;
    };

    if accept.as_bytes() == b"application/json" {
        return true;
    }

    let media = accept
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<Mime>().ok())
        .unwrap_or(mime::STAR_STAR);

    matches!(media.essence_str(), "*/*" | "application/json")
}
