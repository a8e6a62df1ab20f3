//! Dynamic image source decode boundary. A request's `image` field is one
//! plain string that may be a remote URL, a data-URI carrying base64, or
//! raw base64; [`ImageSource::classify`] sniffs which one it is and
//! [`ImageSource::resolve`] collapses it to a [`BitmapHandle`] before
//! anything touches the dispatch engine. Resolved images above the
//! configured spool threshold are written to a temporary file instead of
//! held in memory, so one outsized upload doesn't pin its full size in the
//! process for as long as the task is queued.

use base64::Engine;
use bytes::Bytes;
use inkstream_core::queue::BitmapHandle;
use uuid::Uuid;

use crate::error::ServerError;

/// One of the three accepted shapes for an inbound image.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// `https://...` or `http://...`, fetched by the server.
    Url(String),
    /// `data:image/png;base64,AAAA...`.
    DataUri(String),
    /// Already-decoded bytes, base64-encoded on the wire.
    Base64(String),
}

impl ImageSource {
    /// Sniff which shape `raw` is, by prefix. No ambiguity: only one of
    /// these prefixes is ever a valid base64 alphabet lead-in coincidence
    /// (`data:` and `http`-schemes are not valid base64 characters to start
    /// a meaningful run on their own in practice, and our users are trusted
    /// to send one of the three documented shapes).
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("data:") {
            ImageSource::DataUri(trimmed.to_owned())
        } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            ImageSource::Url(trimmed.to_owned())
        } else {
            ImageSource::Base64(trimmed.to_owned())
        }
    }

    /// Resolve this source into a bitmap handle. A fetch or decode failure
    /// is always a boundary-level 422; the task is never created on this
    /// path. Bitmaps larger than `spool_threshold_bytes` are written to a
    /// temporary file and returned as [`BitmapHandle::Disk`].
    pub async fn resolve(&self, spool_threshold_bytes: usize) -> Result<BitmapHandle, ServerError> {
        let bytes = match self {
            ImageSource::Url(url) => fetch_url(url).await?,
            ImageSource::DataUri(uri) => decode_data_uri(uri)?,
            ImageSource::Base64(data) => decode_base64(data)?,
        };
        to_handle(bytes, spool_threshold_bytes)
    }
}

fn to_handle(bytes: Bytes, spool_threshold_bytes: usize) -> Result<BitmapHandle, ServerError> {
    if bytes.len() <= spool_threshold_bytes {
        return Ok(BitmapHandle::Memory(bytes));
    }
    let path = std::env::temp_dir().join(format!("inkstream-bitmap-{}.bin", Uuid::new_v4()));
    std::fs::write(&path, &bytes).map_err(|e| ServerError::Decode(format!("failed to spool image to disk: {e}")))?;
    Ok(BitmapHandle::Disk(path))
}

async fn fetch_url(url: &str) -> Result<Bytes, ServerError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ServerError::Decode(format!("invalid image URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ServerError::Decode(format!(
            "unsupported image URL scheme: {}",
            parsed.scheme()
        )));
    }

    let response = reqwest::get(parsed)
        .await
        .map_err(|e| ServerError::Decode(format!("failed to fetch image: {e}")))?;
    if !response.status().is_success() {
        return Err(ServerError::Decode(format!(
            "image fetch returned status {}",
            response.status()
        )));
    }
    response
        .bytes()
        .await
        .map_err(|e| ServerError::Decode(format!("failed to read image body: {e}")))
}

fn decode_data_uri(uri: &str) -> Result<Bytes, ServerError> {
    let comma = uri
        .find(',')
        .ok_or_else(|| ServerError::Decode("data URI is missing a ',' separator".into()))?;
    let (header, payload) = uri.split_at(comma);
    let payload = &payload[1..];
    if !header.contains("base64") {
        return Err(ServerError::Decode("data URI must be base64-encoded".into()));
    }
    decode_base64(payload)
}

fn decode_base64(data: &str) -> Result<Bytes, ServerError> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map(Bytes::from)
        .map_err(|e| ServerError::Decode(format!("invalid base64 image data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_SPOOL: usize = usize::MAX;

    #[tokio::test]
    async fn decodes_plain_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"pixels");
        let source = ImageSource::classify(&encoded);
        assert!(matches!(source, ImageSource::Base64(_)));
        let handle = source.resolve(NO_SPOOL).await.unwrap();
        assert!(matches!(handle, BitmapHandle::Memory(_)));
        assert_eq!(handle.load().unwrap(), Bytes::from_static(b"pixels"));
    }

    #[tokio::test]
    async fn decodes_data_uri() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"pixels");
        let source = ImageSource::classify(&format!("data:image/png;base64,{encoded}"));
        assert!(matches!(source, ImageSource::DataUri(_)));
        assert_eq!(source.resolve(NO_SPOOL).await.unwrap().load().unwrap(), Bytes::from_static(b"pixels"));
    }

    #[tokio::test]
    async fn classifies_http_url() {
        assert!(matches!(
            ImageSource::classify("https://example.com/x.png"),
            ImageSource::Url(_)
        ));
    }

    #[tokio::test]
    async fn rejects_malformed_base64() {
        let source = ImageSource::classify("not valid base64!!");
        assert!(source.resolve(NO_SPOOL).await.is_err());
    }

    #[tokio::test]
    async fn rejects_data_uri_without_comma() {
        let source = ImageSource::classify("data:image/png;base64");
        assert!(source.resolve(NO_SPOOL).await.is_err());
    }

    #[tokio::test]
    async fn rejects_non_http_url_scheme() {
        let source = ImageSource::DataUri("x".into());
        let _ = source; // scheme rejection exercised via fetch_url directly below
        assert!(fetch_url("file:///etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn oversized_bitmap_spools_to_disk_and_cleans_up_on_drop() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"pixels");
        let source = ImageSource::classify(&encoded);
        let handle = source.resolve(2).await.unwrap();
        let BitmapHandle::Disk(path) = &handle else {
            panic!("expected a disk-backed handle");
        };
        assert!(path.exists());
        assert_eq!(handle.load().unwrap(), Bytes::from_static(b"pixels"));
        let path = path.clone();
        drop(handle);
        assert!(!path.exists());
    }
}
