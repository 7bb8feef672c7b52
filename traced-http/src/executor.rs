//! Instrumented GET and POST.
//!
//! One call is one linear sequence: build the request, acquire a connection
//! while recording its phases, send, drain the body, log, return. Failures
//! are logged and execution carries on with an empty body. Whether the
//! failure reaches the caller depends on the [`ErrorPolicy`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Request, header};
use http_body_util::Full;
use tokio::time::Instant;

use crate::{
    client::ClientFactory,
    error::Error,
    logger::{Level, Logger},
    options::CallOptions,
    trace::PhaseTrace,
};

/// Content type sent with every GET.
const GET_CONTENT_TYPE: &str = "x-www-form-urlencoded";

/// Which failures are handed back in [`RequestOutcome::error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// GET never reports an error. POST reports only body read failures.
    /// Callers detect failed GETs by the empty body.
    #[default]
    Lenient,
    /// Both methods report the first failure of any kind.
    Strict,
}

/// What one call produced.
#[derive(Debug)]
pub struct RequestOutcome {
    /// The fully drained response body, empty on failure.
    pub body: Bytes,
    /// Elapsed wall-clock time in seconds, six decimals.
    pub elapsed_seconds: String,
    /// Elapsed wall-clock time in whole milliseconds.
    pub elapsed_millis: String,
    pub error: Option<Error>,
}

impl RequestOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs requests through clients from a shared [`ClientFactory`] and reports
/// every call to the injected [`Logger`].
#[derive(Clone)]
pub struct RequestExecutor {
    factory: ClientFactory,
    logger: Arc<dyn Logger>,
    policy: ErrorPolicy,
}

impl RequestExecutor {
    pub fn new(factory: ClientFactory, logger: Arc<dyn Logger>) -> Self {
        Self {
            factory,
            logger,
            policy: ErrorPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(self, policy: ErrorPolicy) -> Self {
        Self { policy, ..self }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    /// GET `url`, closing the connection afterwards. `timeout` is in seconds.
    pub async fn get(&self, url: &str, timeout: u64) -> RequestOutcome {
        self.get_with(url, CallOptions::new(timeout)).await
    }

    pub async fn get_with(&self, url: &str, call: CallOptions) -> RequestOutcome {
        let start = Instant::now();
        let request = build_request(Method::GET, url, call, Bytes::new(), |headers| {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(GET_CONTENT_TYPE),
            );
            Ok(())
        });
        self.execute(start, Method::GET, url, None, request, call).await
    }

    /// POST `body` to `url` with the caller's headers, closing the connection
    /// afterwards. `timeout` is in seconds.
    pub async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: impl Into<Bytes>,
        timeout: u64,
    ) -> RequestOutcome {
        self.post_with(url, headers, body, CallOptions::new(timeout))
            .await
    }

    pub async fn post_with(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: impl Into<Bytes>,
        call: CallOptions,
    ) -> RequestOutcome {
        let start = Instant::now();
        let body = body.into();
        let request = build_request(Method::POST, url, call, body.clone(), |map| {
            // Last write wins for names that differ only in case.
            for (name, value) in headers {
                map.insert(
                    HeaderName::from_bytes(name.as_bytes())?,
                    HeaderValue::from_str(value)?,
                );
            }
            Ok(())
        });
        self.execute(start, Method::POST, url, Some(&body), request, call)
            .await
    }

    async fn execute(
        &self,
        start: Instant,
        method: Method,
        url: &str,
        request_body: Option<&Bytes>,
        request: Result<Request<Full<Bytes>>, Error>,
        call: CallOptions,
    ) -> RequestOutcome {
        let client = self.factory.client(call.client_options());
        let mut trace = PhaseTrace::new();

        let result = match request {
            Ok(request) => client.execute(request, &mut trace).await,
            Err(err) => Err(err),
        };
        let (body, error) = match result {
            Ok(body) => (body, None),
            Err(err) => {
                let context = if err.is_body_read() {
                    "Couldn't parse response body"
                } else if err.is_invalid_request() {
                    "Error building request"
                } else {
                    "Error sending request to API endpoint"
                };
                self.logger
                    .write(Level::Error, &format!("{context} : {err:?}"));
                (Bytes::new(), Some(err))
            }
        };

        let (elapsed_seconds, elapsed_millis) = format_elapsed(start.elapsed());
        let response_text = String::from_utf8_lossy(&body);
        // Consumers of these lines match on the `milisecond` spelling.
        let message = match request_body {
            Some(sent) => format!(
                "Hit: {url}, Request: {}, Response: {response_text}, Elapse: {elapsed_seconds} second, {elapsed_millis} milisecond, live trace : {trace}",
                String::from_utf8_lossy(sent),
            ),
            None => format!(
                "Hit: {url}, Response: {response_text}, Elapse: {elapsed_seconds} second, {elapsed_millis} milisecond, live trace : {trace}"
            ),
        };
        self.logger.write(Level::Info, &message);

        RequestOutcome {
            body,
            elapsed_seconds,
            elapsed_millis,
            error: self.reported(&method, error),
        }
    }

    fn reported(&self, method: &Method, error: Option<Error>) -> Option<Error> {
        match self.policy {
            ErrorPolicy::Strict => error,
            ErrorPolicy::Lenient if *method == Method::POST => {
                error.filter(Error::is_body_read)
            }
            ErrorPolicy::Lenient => None,
        }
    }
}

fn build_request(
    method: Method,
    url: &str,
    call: CallOptions,
    body: Bytes,
    apply_headers: impl FnOnce(&mut http::HeaderMap) -> Result<(), http::Error>,
) -> Result<Request<Full<Bytes>>, Error> {
    let mut request = Request::builder()
        .method(method)
        .uri(url)
        .body(Full::new(body))?;
    apply_headers(request.headers_mut())?;
    if call.close_after_use {
        request
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    Ok(request)
}

/// Seconds with six decimals and whole milliseconds.
pub fn format_elapsed(elapsed: Duration) -> (String, String) {
    (
        format!("{:.6}", elapsed.as_secs_f64()),
        elapsed.as_millis().to_string(),
    )
}
