//! Blocking `reqwest` backend for [`HttpClient`].

use crate::error::{ClientError, ClientResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse, Method, RequestBody};
use imagesync_codec::WireHeaders;
use reqwest::blocking::{Body, Client};
use std::time::Duration;

/// Default time allowed to establish a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`HttpClient`] backed by a pooled blocking `reqwest` client.
///
/// No overall request timeout is set by default: image transfers can run
/// for as long as the payload takes to stream.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Creates a client with the default connect timeout and no request timeout.
    pub fn new() -> ClientResult<Self> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, None)
    }

    /// Creates a client with explicit timeouts.
    pub fn with_timeouts(connect: Duration, request: Option<Duration>) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .build()
            .map_err(|e| ClientError::transport_fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            // A sized body sets its own length.
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let RequestBody::Stream(payload) = request.body {
            let length = payload.length();
            builder = builder.body(Body::sized(payload.into_reader(), length));
        }

        let response = builder.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let headers: WireHeaders = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Ok(HttpResponse {
            status,
            headers,
            body: Box::new(response),
        })
    }
}
