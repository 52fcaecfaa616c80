#![doc = "HTTP upload transport: sends files to the backend's upload endpoint as multipart requests."]
//
//! # HTTP transport (CLI <-> Core)
//!
//! This module implements [`UploadTransport`] from [`upload_sync_core::contract`]
//! against a REST backend:
//!
//! - `POST {base_url}/upload` with a multipart body: the file under `file`, and
//!   every configured extra field next to it as text.
//! - Optional bearer token, 60 second request timeout.
//! - The body is streamed in chunks so progress can be reported as it is sent.
//! - The response is the backend's envelope `{ code, msg, data }`; `code == 200`
//!   with a `data` object is a success, anything else is a rejection.
//!
//! Construct with [`HttpUploadTransport::new`], or from the loaded
//! [`ApiSettings`] / the environment (`UPLOAD_API_URL`, `UPLOAD_API_TOKEN`).

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use upload_sync_core::contract::{
    LocalFile, ProgressReporter, TransportError, UploadOptions, UploadResult, UploadTransport,
};

use crate::load_config::ApiSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CHUNK_SIZE: usize = 64 * 1024;
const SUCCESS_CODE: i64 = 200;

/// Response wrapper every backend endpoint uses.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<UploadResult>,
}

impl ApiEnvelope {
    fn into_result(self) -> Result<UploadResult, TransportError> {
        match (self.code, self.data) {
            (SUCCESS_CODE, Some(data)) => Ok(data),
            (SUCCESS_CODE, None) => Err(TransportError::Decode(
                "response carried no upload result".to_string(),
            )),
            (code, _) => Err(TransportError::Rejected {
                code,
                message: self.msg.unwrap_or_default(),
            }),
        }
    }
}

pub struct HttpUploadTransport {
    http: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpUploadTransport {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(request_error)?;
        let endpoint = format!("{}/upload", base_url.trim_end_matches('/'));
        tracing::info!(endpoint = %endpoint, token_set = token.is_some(), "Initialized HTTP upload transport");
        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    pub fn from_settings(settings: &ApiSettings) -> anyhow::Result<Self> {
        let base_url = settings.base_url.as_deref().ok_or_else(|| {
            tracing::error!("No upload API URL in config or UPLOAD_API_URL");
            anyhow::anyhow!("upload API URL missing: set api.base_url or UPLOAD_API_URL")
        })?;
        Ok(Self::new(base_url, settings.token.clone())?)
    }

    pub fn new_from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let base_url = env::var("UPLOAD_API_URL").map_err(|e| {
            tracing::error!(error = ?e, "UPLOAD_API_URL missing in environment");
            anyhow::anyhow!("UPLOAD_API_URL environment variable not set: {e}")
        })?;
        let token = env::var("UPLOAD_API_TOKEN").ok();
        Ok(Self::new(&base_url, token)?)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload(
        &self,
        file: LocalFile,
        options: UploadOptions,
    ) -> Result<UploadResult, TransportError> {
        tracing::info!(file = %file.name, size = file.size, endpoint = %self.endpoint, "Uploading file");

        let mut part = Part::stream_with_length(
            Body::wrap_stream(progress_stream(file.bytes, options.progress.clone())),
            file.size,
        )
        .file_name(file.name.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| TransportError::Request(format!("invalid content type: {e}")))?;
        }

        let mut form = Form::new().part("file", part);
        for (key, value) in options.extra_data {
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            form = form.text(key, text);
        }

        let mut request = self.http.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let exchange = async {
            let response = request.send().await?.error_for_status()?;
            response.json::<ApiEnvelope>().await
        };
        let envelope = tokio::select! {
            _ = options.cancel.cancelled() => {
                tracing::info!(file = %file.name, "Upload request aborted");
                return Err(TransportError::Cancelled);
            }
            res = exchange => res.map_err(request_error)?,
        };

        match envelope.into_result() {
            Ok(result) => {
                tracing::info!(id = %result.id, url = %result.url, "Backend accepted upload");
                Ok(result)
            }
            Err(e) => {
                tracing::error!(file = %file.name, error = %e, "Backend refused upload");
                Err(e)
            }
        }
    }
}

/// Splits `bytes` into chunks and reports progress as each one is pulled.
fn progress_stream(
    bytes: Vec<u8>,
    progress: ProgressReporter,
) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + Sync + 'static {
    let total = bytes.len() as u64;
    let chunks: Vec<Vec<u8>> = bytes.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
    let mut loaded = 0u64;
    futures::stream::iter(chunks).map(move |chunk| {
        loaded += chunk.len() as u64;
        progress.report(loaded, total);
        Ok::<_, std::io::Error>(chunk)
    })
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_decode() {
        TransportError::Decode(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_data_is_success() {
        let json = r#"{"code":200,"msg":"ok","data":{"id":"1","url":"https://x/a.png","fileName":"a1.png","originalName":"a.png"}}"#;
        let envelope: ApiEnvelope = serde_json::from_str(json).unwrap();
        let result = envelope.into_result().unwrap();
        assert_eq!(result.url, "https://x/a.png");
        assert_eq!(result.thumbnail_url, None);
    }

    #[test]
    fn envelope_with_error_code_is_rejection() {
        let envelope: ApiEnvelope =
            serde_json::from_str(r#"{"code":500,"msg":"quota exceeded"}"#).unwrap();
        match envelope.into_result() {
            Err(TransportError::Rejected { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn endpoint_joins_base_url() {
        let transport = HttpUploadTransport::new("http://localhost:8080/api/", None).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:8080/api/upload");
    }
}
