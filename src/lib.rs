#![doc = include_str!("../README.md")]

#[cfg(feature = "reqwest")]
pub mod client;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod http_request;
pub mod openai;
pub mod session;
pub mod terminal;

use std::{fmt, sync::Arc};

use conversation::Turn;
use http_request::HttpRequest;
use openai::ChatBody;

pub use openai::deserialize_response;

/// An OpenAI API configuration.
#[derive(Clone)]
pub struct Api {
    /// The API key, sent as a bearer token.
    api_key: Arc<str>,
    /// The default model to use for requests.
    default_model: Arc<str>,
    /// The default maximum number of tokens for responses, if any.
    default_max_tokens: Option<u32>,
    /// The API endpoint host (without protocol or path).
    endpoint_host: Arc<str>,
    /// Whether to connect over HTTPS.
    use_tls: bool,
}

impl Api {
    /// Creates a new API instance.
    ///
    /// Requires a valid API key.
    pub fn new<S: Into<Arc<str>>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            default_model: Arc::from(openai::DEFAULT_MODEL),
            default_max_tokens: None,
            endpoint_host: Arc::from(openai::DEFAULT_ENDPOINT_HOST),
            use_tls: true,
        }
    }

    /// Sets the default model for requests.
    ///
    /// If not set, [`openai::DEFAULT_MODEL`] will be used.
    pub fn default_model<S: Into<Arc<str>>>(mut self, model: S) -> Self {
        self.default_model = model.into();
        self
    }

    /// Sets the default maximum tokens for responses.
    ///
    /// If not set, the server decides.
    pub fn default_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Sets the API endpoint host.
    ///
    /// If not set, [`openai::DEFAULT_ENDPOINT_HOST`] will be used.
    pub fn endpoint_host<S: Into<Arc<str>>>(mut self, endpoint_host: S) -> Self {
        self.endpoint_host = endpoint_host.into();
        self
    }

    /// Sets whether requests use HTTPS.
    ///
    /// On by default. Local OpenAI-compatible servers usually speak plain HTTP.
    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Returns the configured default model.
    pub fn model(&self) -> &str {
        &self.default_model
    }

    /// Creates the required headers for any API request.
    fn create_default_headers(&self) -> Vec<(&'static str, Arc<str>)> {
        vec![
            ("content-type", Arc::from("application/json")),
            (
                "authorization",
                Arc::from(format!("Bearer {}", self.api_key)),
            ),
        ]
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("api_key", &"x".repeat(self.api_key.len()))
            .field("default_model", &self.default_model)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("endpoint_host", &self.endpoint_host)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

/// Builder for a chat completion request.
#[derive(Debug, Default)]
pub struct ChatRequestBuilder {
    /// The model to use for the request.
    ///
    /// If none is provided, the default model will be used.
    model: Option<String>,
    /// The maximum number of tokens for the response.
    ///
    /// If none is provided, the default max tokens will be used.
    max_tokens: Option<u32>,
    /// Whether to request a streamed response.
    stream: bool,
    /// The turns to send.
    turns: im::Vector<Turn>,
}

impl ChatRequestBuilder {
    /// Creates a new chat request builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model for the request.
    pub fn model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the maximum tokens for the request.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Requests incremental delivery of the reply.
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Appends a turn to the request.
    pub fn push(mut self, turn: Turn) -> Self {
        self.turns.push_back(turn);
        self
    }

    /// Replace all turns in the request with given turns.
    pub fn set_turns(mut self, turns: im::Vector<Turn>) -> Self {
        self.turns = turns;
        self
    }

    /// Builds the HTTP request.
    pub fn build(&self, api: &Api) -> HttpRequest {
        let body = ChatBody {
            model: self.model.as_deref().unwrap_or(&api.default_model),
            messages: &self.turns,
            stream: self.stream,
            max_tokens: self.max_tokens.or(api.default_max_tokens),
        };

        HttpRequest {
            host: api.endpoint_host.to_string(),
            tls: api.use_tls,
            path: openai::CHAT_COMPLETIONS_PATH.to_string(),
            method: "POST",
            headers: api.create_default_headers(),
            body: serde_json::to_string(&body).expect("failed to serialize chat request"),
        }
    }
}

/// A completion error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("API error: {0}")]
    Api(#[from] openai::ApiError),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Stream ended before the reply was complete")]
    StreamEnded,
    #[error("Response contained no assistant message")]
    EmptyResponse,
    /// A stream failed after some of the reply had arrived.
    #[error("Response stream interrupted: {source}")]
    StreamInterrupted { partial: String, source: Box<Error> },
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::{Api, ChatRequestBuilder, conversation::Turn};

    #[test]
    fn test_chat_request_builder_defaults() {
        let api = Api::new("test-api-key");

        let http_request = ChatRequestBuilder::new()
            .push(Turn::user("Hello!"))
            .build(&api);

        assert_eq!(http_request.method, "POST");
        assert_eq!(http_request.path, "/v1/chat/completions");
        assert_eq!(http_request.host, "api.openai.com");

        let body: serde_json::Value = serde_json::from_str(&http_request.body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Hello!"}],
                "stream": false
            })
        );
    }

    #[test]
    fn test_chat_request_builder_overrides() {
        let api = Api::new("test-api-key")
            .default_model("gpt-4-turbo")
            .default_max_tokens(Some(64))
            .endpoint_host("llm.internal.example");

        let mut turns = im::Vector::new();
        turns.push_back(Turn::user("Hi"));
        turns.push_back(Turn::assistant("Hello"));
        turns.push_back(Turn::user("Again"));

        let http_request = ChatRequestBuilder::new()
            .model("gpt-4o")
            .max_tokens(256)
            .stream(true)
            .set_turns(turns)
            .build(&api);

        assert_eq!(http_request.host, "llm.internal.example");
        let body: serde_json::Value = serde_json::from_str(&http_request.body).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][1]["role"], "assistant");
    }

    #[test]
    fn test_headers_carry_bearer_token() {
        let api = Api::new("sk-test");
        let http_request = ChatRequestBuilder::new().build(&api);

        assert!(
            http_request
                .headers
                .iter()
                .any(|(k, v)| *k == "authorization" && v.as_ref() == "Bearer sk-test")
        );
        assert!(
            http_request
                .headers
                .iter()
                .any(|(k, v)| *k == "content-type" && v.as_ref() == "application/json")
        );
    }

    #[test]
    fn test_api_debug_masks_key() {
        let rendered = format!("{:?}", Api::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("xxxxxxxxx"));
    }
}
