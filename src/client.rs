use std::env;
use std::pin::Pin;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use url::Url;

use crate::error::{Error, ErrorResponse, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{GenerateContentParams, GenerateContentResponse};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// A boxed stream of response chunks.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<GenerateContentResponse>> + Send>>;

/// Client for the Gemini API.
///
/// A missing API key is not an error at construction time.  Every request made
/// without one fails with an authentication error instead.
///
/// The timeout bounds connecting, waiting for response headers, and the whole
/// body of a blocking request.  A streamed body has no total deadline; each
/// read must make progress within the timeout instead.
#[derive(Debug, Clone)]
pub struct Gemini {
    api_key: Option<String>,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl Gemini {
    /// Create a new Gemini client.
    ///
    /// The API key can be provided directly or read from the GEMINI_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key
            .or_else(|| env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty());

        let mut base_url = base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)?;

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// True if an API key was supplied or found in the environment.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::authentication(format!(
                "API key not provided and {API_KEY_ENV} environment variable not set"
            ))
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|_| Error::authentication("API key contains invalid characters"))?,
        );
        Ok(headers)
    }

    /// Build `{base}models/{model}:{method}`.
    fn endpoint(&self, params: &GenerateContentParams, method: &str) -> Result<Url> {
        Ok(self
            .base_url
            .join(&format!("models/{}:{method}", params.model))?)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        match serde_json::from_str::<ErrorResponse>(&error_body) {
            Ok(parsed) => parsed.into_error(status_code, retry_after),
            Err(_) => Error::from_status(status_code, None, error_body, retry_after),
        }
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    async fn post(
        &self,
        url: Url,
        headers: HeaderMap,
        params: &GenerateContentParams,
        whole_body_deadline: bool,
    ) -> Result<Response> {
        CLIENT_REQUESTS.click();
        tracing::debug!(
            model = %params.model,
            contents = params.request.contents.len(),
            %url,
            "sending request"
        );
        let start = Instant::now();
        let mut request = self.client.post(url).headers(headers).json(&params.request);
        if whole_body_deadline {
            request = request.timeout(self.timeout);
        }
        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(response) => response.map_err(|e| self.request_error(e)),
            Err(_) => Err(Error::timeout(
                "Request timed out waiting for response headers",
                Some(self.timeout.as_secs_f64()),
            )),
        };
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                return Err(err);
            }
        };
        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::debug!(error = %err, "request rejected");
            return Err(err);
        }
        Ok(response)
    }

    /// Send a request to the API and get a non-streaming response.
    pub async fn send(&self, params: GenerateContentParams) -> Result<GenerateContentResponse> {
        let headers = self.default_headers()?;
        let url = self.endpoint(&params, "generateContent")?;
        let response = self.post(url, headers, &params, true).await?;

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| match e.is_decode() {
                true => Error::serialization(
                    format!("Failed to parse response: {e}"),
                    Some(Box::new(e)),
                ),
                false => self.request_error(e),
            })
    }

    /// Send a request to the API and get a streaming response.
    ///
    /// Returns a stream of response chunks that can be processed incrementally.
    pub async fn stream(&self, params: GenerateContentParams) -> Result<ResponseStream> {
        let mut headers = self.default_headers()?;
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let mut url = self.endpoint(&params, "streamGenerateContent")?;
        url.query_pairs_mut().append_pair("alt", "sse");

        let response = self.post(url, headers, &params, false).await?;
        let body = idle_timeout(response.bytes_stream(), self.timeout);
        Ok(Box::pin(process_sse(body)))
    }
}

/// Fail a body stream when a single read waits longer than `idle`.
///
/// The clock only runs while the stream is polled, so a slow consumer never
/// trips it.  The stream ends after the first error.
fn idle_timeout<S>(body: S, idle: Duration) -> impl Stream<Item = Result<Bytes>> + Send + Unpin
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    let reads = stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(bytes))) => Some((Ok(bytes), Some(body))),
            Ok(Some(Err(e))) => Some((
                Err(Error::streaming(
                    format!("Error in HTTP stream: {e}"),
                    Some(Box::new(e)),
                )),
                None,
            )),
            Ok(None) => None,
            Err(_) => Some((
                Err(Error::timeout(
                    format!(
                        "No data received for {} seconds while streaming",
                        idle.as_secs_f64()
                    ),
                    Some(idle.as_secs_f64()),
                )),
                None,
            )),
        }
    });
    Box::pin(reads)
}
