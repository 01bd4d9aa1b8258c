//! Multipart uploads, including re-uploading a file fetched from a URL.

use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::client::HttpTransport;

/// Form field name used for uploaded files.
pub const FILE_FIELD: &str = "file";

const FALLBACK_FILE_NAME: &str = "file";

impl HttpTransport {
    /// POST `bytes` as a single multipart file part. The part's content
    /// type is guessed from `file_name`.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &HeaderMap,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Option<T> {
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        let part = match Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime.essence_str())
        {
            Ok(p) => p,
            Err(e) => {
                error!(file = %file_name, error = %e, "Invalid upload content type");
                return None;
            }
        };
        let form = Form::new().part(FILE_FIELD, part);

        debug!(url = %url, file = %file_name, mime = %mime, "Uploading file");
        let request = self.client().post(url).headers(headers.clone()).multipart(form);
        let text = self.execute_text(request, url, None).await?;

        match serde_json::from_str(&text) {
            Ok(v) => Some(v),
            Err(e) => {
                error!(url = %url, error = %e, "Failed to decode upload response");
                None
            }
        }
    }

    /// Download `file_url`, then upload it to `url`.
    ///
    /// The file name comes from the download's `Content-Disposition`
    /// header, falling back to the last path segment of `file_url`.
    pub async fn upload_from_url<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &HeaderMap,
        file_url: &str,
    ) -> Option<T> {
        let response = match self.client().get(file_url).send().await {
            Ok(r) => r,
            Err(e) => {
                error!(url = %file_url, error = %e, "File download failed");
                return None;
            }
        };
        if !response.status().is_success() {
            error!(url = %file_url, status = %response.status(), "File download rejected");
            return None;
        }

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_content_disposition)
            .unwrap_or_else(|| filename_from_url(file_url));

        let bytes = match response.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) => {
                error!(url = %file_url, error = %e, "Failed to read downloaded file");
                return None;
            }
        };

        self.upload(url, headers, &file_name, bytes).await
    }
}

/// Extract the file name from a `Content-Disposition` value.
///
/// Quotes and any directory prefix are stripped. Returns `None` when no
/// `filename` parameter is present.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("filename") {
            continue;
        }
        let name = raw.trim().trim_matches('"');
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        if name.is_empty() {
            warn!(header = %value, "Empty filename in Content-Disposition");
            return None;
        }
        return Some(name.to_string());
    }
    None
}

fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(seg) if !seg.is_empty() && !seg.contains(':') => seg.to_string(),
        _ => FALLBACK_FILE_NAME.to_string(),
    }
}
