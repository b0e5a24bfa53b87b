//! Abstract HTTP request.
//!
//! The [`HttpRequest`] type represents an HTTP request that can (and should) be sent to the
//! chat completions endpoint, without committing to a specific HTTP client.
//!
//! ## Features
//!
//! If the `reqwest` feature is enabled, the [`HttpRequest`] type can be converted to a
//! [`reqwest::Request`] or a [`reqwest::RequestBuilder`] using the `try_into_reqwest` or
//! `try_into_reqwest_builder` methods.

use std::{fmt, sync::Arc};

/// HTTP request encapsulation.
///
/// This type represents an HTTP request. Supports pretty-printing the request as a string (through
/// the [`std::fmt::Display`] trait), with the credential masked.
#[derive(Debug)]
pub struct HttpRequest {
    /// Request host.
    pub host: String,
    /// Whether to use HTTPS.
    pub tls: bool,
    /// Request path.
    pub path: String,
    /// HTTP method.
    pub method: &'static str,
    /// Request headers.
    pub headers: Vec<(&'static str, Arc<str>)>,
    /// Request body.
    pub body: String,
}

/// Headers whose values are never rendered.
const SENSITIVE_HEADERS: &[&str] = &["authorization"];

impl HttpRequest {
    /// Renders the headers as a string.
    ///
    /// Does not include the `Host` header. Sensitive values are masked.
    pub fn render_headers(&self) -> String {
        self.headers
            .iter()
            .map(|(k, v)| format!("{}: {}", k, display_value(k, v)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the full URL of the request.
    pub fn url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}{}", scheme, self.host, self.path)
    }
}

fn display_value<'a>(key: &str, value: &'a str) -> &'a str {
    if SENSITIVE_HEADERS.contains(&key) {
        "<redacted>"
    } else {
        value
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} HTTP/1.1", self.method, self.path)?;

        writeln!(f, "Host: {}", self.host)?;
        writeln!(f, "{}", self.render_headers())?;

        // Empty line between headers and body
        writeln!(f)?;

        write!(f, "{}", self.body)
    }
}

#[cfg(feature = "reqwest")]
impl HttpRequest {
    /// Converts this [`HttpRequest`] into a [`reqwest::Request`].
    pub fn try_into_reqwest(self) -> Result<reqwest::Request, crate::Error> {
        let method = reqwest::Method::from_bytes(self.method.as_bytes()).map_err(invalid)?;
        let url = reqwest::Url::parse(&self.url()).map_err(invalid)?;
        let mut request = reqwest::Request::new(method, url);

        *request.body_mut() = Some(self.body.into());

        let headers = request.headers_mut();
        for (key, value) in self.headers {
            let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(invalid)?;
            let header_value = reqwest::header::HeaderValue::from_str(&value).map_err(invalid)?;
            headers.insert(header_name, header_value);
        }

        Ok(request)
    }

    /// Converts this [`HttpRequest`] into a [`reqwest::RequestBuilder`] using the provided client.
    pub fn try_into_reqwest_builder(
        self,
        client: &reqwest::Client,
    ) -> Result<reqwest::RequestBuilder, crate::Error> {
        let method = reqwest::Method::from_bytes(self.method.as_bytes()).map_err(invalid)?;
        let url = reqwest::Url::parse(&self.url()).map_err(invalid)?;

        let mut request_builder = client.request(method, url).body(self.body);

        for (key, value) in self.headers {
            request_builder = request_builder.header(key, value.as_ref());
        }

        Ok(request_builder)
    }
}

#[cfg(feature = "reqwest")]
fn invalid<E: fmt::Display>(err: E) -> crate::Error {
    crate::Error::InvalidRequest(err.to_string())
}
