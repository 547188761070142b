//! # HTTP Transport
//!
//! [`PeerTransport`] over plain HTTP with JSON bodies. Protocol headers
//! travel as HTTP headers in both directions.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::trace;

use crate::domain::{ProtocolHeaders, WireReply, WireRequest};
use crate::ports::{PeerTransport, TransportError};

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` caps a single HTTP exchange. Callers still apply their own
    /// per-request deadlines on top.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Refused(format!("cannot build http client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn header_map(headers: &ProtocolHeaders) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers.pairs() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            map.insert(HeaderName::from_static(name), value);
        }
    }
    map
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_decode() || error.is_body() {
        TransportError::Decode(error.to_string())
    } else {
        TransportError::Refused(error.to_string())
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn send(
        &self,
        target: SocketAddr,
        headers: &ProtocolHeaders,
        request: &WireRequest,
    ) -> Result<WireReply, TransportError> {
        let url = format!("http://{target}{}", request.path());
        trace!(%url, request = request.name(), "[dc-01] http request");

        let builder = match request.body() {
            Some(body) => self.client.post(&url).json(&body),
            None => self.client.get(&url),
        };
        let response = builder
            .headers(header_map(headers))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let reply_headers = ProtocolHeaders::from_lookup(|name| {
            response.headers().get(name).and_then(|v| v.to_str().ok())
        });
        let bytes = response.bytes().await.map_err(classify)?;
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?
        };

        Ok(WireReply {
            status,
            headers: reply_headers,
            body,
        })
    }
}
