use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::data::ProbeMethod;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Status line and the headers segmented fetching cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Parsed `Content-Length`, `None` when absent or malformed.
    pub content_length: Option<u64>,
    /// Raw `Accept-Ranges` value.
    pub accept_ranges: Option<String>,
    /// Raw `Content-Range` value.
    pub content_range: Option<String>,
}

/// A response whose body has not been read yet.
pub struct Response<E> {
    pub head: ResponseHead,
    pub body: BoxStream<'static, Result<Bytes, E>>,
}

/// Asynchronous HTTP client abstraction.
///
/// The minimal interface needed by the prober and the range workers.
/// Implementations handle their own redirect following, TLS and connection
/// pooling.
///
/// # Implementations
///
/// - [`ReqwestClient`]: production implementation using `reqwest`
/// - In-memory mocks in tests
pub trait HttpClient: Send + Sync {
    /// Error type for transport failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue the metadata request and return its head. A `GET` probe must not
    /// read the body.
    fn probe(
        &self,
        url: &str,
        method: ProbeMethod,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<ResponseHead, Self::Error>> + Send;

    /// Issue a `GET`, with `Range: <range>` when `range` is given.
    fn get(
        &self,
        url: &str,
        range: Option<&str>,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<Response<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use crate::core::content_length;
    use futures_util::StreamExt;
    use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, HeaderName, RANGE};

    const USER_AGENT: &str = concat!("parget/", env!("CARGO_PKG_VERSION"));

    /// Production HTTP client implementation using reqwest.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Create a client with the default configuration.
        pub fn new() -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
            Ok(Self { client })
        }

        /// Wrap an already configured client (proxies, timeouts, ...).
        pub fn from_client(client: reqwest::Client) -> Self {
            Self { client }
        }

        fn with_headers(
            mut request: reqwest::RequestBuilder,
            headers: &[(String, String)],
        ) -> reqwest::RequestBuilder {
            for (key, value) in headers {
                request = request.header(key, value);
            }
            request
        }
    }

    // Read headers directly: `Response::content_length` reports the body size
    // hint, which is 0 for HEAD responses.
    fn head_of(response: &reqwest::Response) -> ResponseHead {
        let headers = response.headers();
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        ResponseHead {
            status: response.status().as_u16(),
            content_length: text(CONTENT_LENGTH).as_deref().and_then(content_length),
            accept_ranges: text(ACCEPT_RANGES),
            content_range: text(CONTENT_RANGE),
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn probe(
            &self,
            url: &str,
            method: ProbeMethod,
            headers: &[(String, String)],
        ) -> Result<ResponseHead, Self::Error> {
            let request = match method {
                ProbeMethod::Head => self.client.head(url),
                ProbeMethod::Get => self.client.get(url),
            };
            let response = Self::with_headers(request, headers).send().await?;
            Ok(head_of(&response))
        }

        async fn get(
            &self,
            url: &str,
            range: Option<&str>,
            headers: &[(String, String)],
        ) -> Result<Response<Self::Error>, Self::Error> {
            let mut request = Self::with_headers(self.client.get(url), headers);
            if let Some(range) = range {
                request = request.header(RANGE, range);
            }

            let response = request.send().await?;
            let head = head_of(&response);
            let body = response.bytes_stream().boxed();

            Ok(Response { head, body })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
