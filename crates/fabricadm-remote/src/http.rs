use crate::{ApiError, RemoteError};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::time::Duration;

/// Blocking JSON client for one control-plane API.
///
/// HTTP error statuses are not transport errors here: their bodies are
/// decoded into [`ApiError`] so callers can classify the failure.
pub struct JsonClient {
    service: &'static str,
    base_url: String,
    agent: ureq::Agent,
}

impl JsonClient {
    pub fn new(service: &'static str, base_url: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            service,
            base_url: base_url.trim_end_matches('/').to_owned(),
            agent,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        tracing::debug!("{} GET {url} {query:?}", self.service);
        let mut req = self.agent.get(&url).header("Accept", "application/json");
        for (k, v) in query {
            req = req.query(*k, *v);
        }
        let resp = req.call().map_err(|e| RemoteError::Http(e.to_string()))?;
        self.decode(&url, resp)
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        let data = encode_body(body)?;
        tracing::debug!("{} POST {url} ({} bytes)", self.service, data.len());
        let mut req = self
            .agent
            .post(&url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json");
        for (k, v) in query {
            req = req.query(*k, *v);
        }
        let resp = req
            .send(&data[..])
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        self.decode(&url, resp)
    }

    pub fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        let data = encode_body(body)?;
        tracing::debug!("{} PUT {url} ({} bytes)", self.service, data.len());
        let resp = self
            .agent
            .put(&url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .send(&data[..])
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        self.decode(&url, resp)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        url: &str,
        resp: ureq::http::Response<ureq::Body>,
    ) -> Result<T, RemoteError> {
        let status = resp.status().as_u16();
        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Http(e.to_string()))?;

        if status >= 400 {
            let error = decode_error_body(status, &body);
            tracing::debug!("{} {url}: HTTP {status}: {error}", self.service);
            return Err(RemoteError::api(self.service, status, error));
        }

        serde_json::from_slice(&body).map_err(|e| {
            RemoteError::Serialization(format!("invalid {} response from {url}: {e}", self.service))
        })
    }
}

fn encode_body<B: Serialize>(body: &B) -> Result<Vec<u8>, RemoteError> {
    serde_json::to_vec(body).map_err(|e| RemoteError::Serialization(e.to_string()))
}

/// Decode an error body, falling back to the raw text when it is not the
/// usual `{code, message, errors}` shape.
pub fn decode_error_body(status: u16, body: &[u8]) -> ApiError {
    if let Ok(err) = serde_json::from_slice::<ApiError>(body) {
        if !err.code.is_empty() || !err.message.is_empty() {
            return err;
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_owned();
    ApiError {
        code: if status == 404 {
            crate::CODE_NOT_FOUND.to_owned()
        } else {
            String::new()
        },
        message: if text.is_empty() {
            format!("HTTP {status}")
        } else {
            text
        },
        errors: Vec::new(),
    }
}

/// Everything but unreserved characters, so `/` and `%` cannot leak into the
/// path.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single path segment.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
