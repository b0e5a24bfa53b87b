//! OpenAI chat completion API types.
//!
//! This module contains the request and response shapes of the `/v1/chat/completions` endpoint,
//! both for whole responses and for the server-sent event stream.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Error, conversation::Turn};

/// Default API endpoint host to use.
pub const DEFAULT_ENDPOINT_HOST: &str = "api.openai.com";

/// Path of the chat completions endpoint.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Default model to use for requests.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Payload of the final event of a completion stream.
pub const DONE_MARKER: &str = "[DONE]";

/// The body of a request to the chat completions endpoint.
///
/// Usually it is better to use [`crate::ChatRequestBuilder`] instead.
#[derive(Debug, Serialize)]
pub struct ChatBody<'a> {
    /// The model to use for the request.
    pub model: &'a str,
    /// The conversation so far, oldest turn first.
    pub messages: &'a im::Vector<Turn>,
    /// Whether the reply should be delivered as a stream of chunks.
    pub stream: bool,
    /// Upper bound on the number of tokens in the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// OpenAI API error.
///
/// The error object found in the body of a failed request. Does not include transport errors.
#[derive(Clone, Debug, thiserror::Error, Deserialize, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Usually a string, some compatible servers send numbers.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// A response from the API, either the expected payload or an error object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Error { error: ApiError },
    Success(T),
}

/// Deserializes an API response from JSON, turning error objects into [`Error::Api`].
pub fn deserialize_response<T>(json: &str) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    match serde_json::from_str::<ApiResponse<T>>(json)? {
        ApiResponse::Error { error } => Err(Error::Api(error)),
        ApiResponse::Success(response) => Ok(response),
    }
}

/// Builds the error for a non-successful HTTP response.
///
/// Prefers the API's own error object, falls back to the raw status and body.
pub fn error_from_body(status: u16, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ApiError,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => Error::Api(error),
        Err(_) => Error::Status {
            status,
            body: body.to_owned(),
        },
    }
}

/// A complete (non-streamed) chat completion.
#[derive(Debug, Deserialize, Serialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Returns the text of the first choice, if there is one.
    pub fn into_text(self) -> Option<String> {
        self.choices.into_iter().next()?.message.content
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChoiceMessage {
    pub role: crate::conversation::Role,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One chunk of a streamed chat completion.
#[derive(Debug, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Returns the text carried by the first choice.
    ///
    /// Role announcements, finish markers and usage-only chunks carry none.
    pub fn into_fragment(self) -> Option<String> {
        self.choices.into_iter().next()?.delta.content
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Decoded payload of a single server-sent event.
#[derive(Debug, PartialEq)]
pub enum StreamData {
    /// A chunk, possibly without any text.
    Fragment(Option<String>),
    /// The stream is complete.
    Done,
}

/// Decodes the `data` of one server-sent event.
pub fn parse_stream_data(data: &str) -> Result<StreamData, Error> {
    let data = data.trim();
    if data == DONE_MARKER {
        return Ok(StreamData::Done);
    }

    let chunk: ChatCompletionChunk = deserialize_response(data)?;
    Ok(StreamData::Fragment(chunk.into_fragment()))
}

#[cfg(test)]
mod tests {
    use super::{
        ChatCompletion, StreamData, deserialize_response, error_from_body, parse_stream_data,
    };
    use crate::Error;

    fn chunk_json(content: &str) -> String {
        format!(
            r#"{{
  "id": "chatcmpl-123",
  "object": "chat.completion.chunk",
  "created": 1694268190,
  "model": "gpt-4o-mini",
  "choices": [
    {{ "index": 0, "delta": {{ "content": {} }}, "finish_reason": null }}
  ]
}}"#,
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn test_completion_deserialization() {
        let json = r#"{
  "id": "chatcmpl-abc123",
  "object": "chat.completion",
  "created": 1677858242,
  "model": "gpt-4o-mini",
  "usage": {
    "prompt_tokens": 13,
    "completion_tokens": 7,
    "total_tokens": 20
  },
  "choices": [
    {
      "message": {
        "role": "assistant",
        "content": "Hi there"
      },
      "logprobs": null,
      "finish_reason": "stop",
      "index": 0
    }
  ]
}"#;

        let completion: ChatCompletion =
            deserialize_response(json).expect("should deserialize completion");

        assert_eq!(completion.id, "chatcmpl-abc123");
        assert_eq!(completion.usage.as_ref().unwrap().total_tokens, 20);
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.into_text().as_deref(), Some("Hi there"));
    }

    #[test]
    fn test_completion_without_choices_has_no_text() {
        let completion: ChatCompletion =
            deserialize_response(r#"{"id":"x","model":"m","choices":[]}"#).unwrap();
        assert_eq!(completion.into_text(), None);
    }

    #[test]
    fn test_api_error_deserialization() {
        let json = r#"{
  "error": {
    "message": "Incorrect API key provided: sk-xxxx.",
    "type": "invalid_request_error",
    "param": null,
    "code": "invalid_api_key"
  }
}"#;

        let result: Result<ChatCompletion, _> = deserialize_response(json);

        let Err(Error::Api(api_error)) = result else {
            panic!("expected Api error");
        };
        assert_eq!(api_error.kind.as_deref(), Some("invalid_request_error"));
        assert_eq!(api_error.to_string(), "Incorrect API key provided: sk-xxxx.");
    }

    #[test]
    fn test_error_from_body() {
        let api = error_from_body(429, r#"{"error":{"message":"Rate limit reached","code":null}}"#);
        assert!(matches!(api, Error::Api(ref e) if e.message == "Rate limit reached"));

        let raw = error_from_body(502, "<html>Bad Gateway</html>");
        assert!(matches!(raw, Error::Status { status: 502, ref body } if body.contains("Bad Gateway")));
    }

    #[test]
    fn test_parse_stream_data() {
        assert_eq!(
            parse_stream_data(&chunk_json("Hello")).unwrap(),
            StreamData::Fragment(Some("Hello".to_owned()))
        );
        assert_eq!(parse_stream_data(" [DONE]\n").unwrap(), StreamData::Done);
    }

    #[test]
    fn test_parse_stream_data_without_text() {
        let role_only = r#"{"id":"c","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        let finish = r#"{"id":"c","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        let usage_only = r#"{"id":"c","choices":[],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#;

        for data in [role_only, finish, usage_only] {
            assert_eq!(parse_stream_data(data).unwrap(), StreamData::Fragment(None));
        }
    }

    #[test]
    fn test_parse_stream_data_rejects_garbage() {
        assert!(matches!(
            parse_stream_data("not json"),
            Err(Error::Serde(_))
        ));
    }
}
