//! The HTTP implementation of [`Completion`].
//!
//! Whole replies are fetched with a plain `reqwest` request, streamed replies are read as
//! server-sent events through `reqwest-eventsource`. Neither path retries, the first failure ends
//! the request.

use futures::{StreamExt, stream};
use reqwest_eventsource::{Event, EventSource, retry::Never};

use crate::{
    Api, ChatRequestBuilder, Error,
    completion::{Completion, FragmentStream},
    conversation::Conversation,
    openai::{self, ChatCompletion, StreamData},
};

/// Talks to an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ReqwestCompletion {
    api: Api,
    client: reqwest::Client,
}

impl ReqwestCompletion {
    pub fn new(api: Api) -> Self {
        Self::with_client(api, reqwest::Client::new())
    }

    /// Uses an existing client, e.g. one configured with a proxy or custom timeouts.
    pub fn with_client(api: Api, client: reqwest::Client) -> Self {
        Self { api, client }
    }

    fn request(
        &self,
        conversation: &Conversation,
        model: &str,
        stream: bool,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let http_request = ChatRequestBuilder::new()
            .model(model)
            .stream(stream)
            .set_turns(conversation.turns().clone())
            .build(&self.api);

        tracing::debug!(
            url = %http_request.url(),
            model,
            stream,
            turns = conversation.len(),
            "sending chat request"
        );

        http_request.try_into_reqwest_builder(&self.client)
    }
}

impl Completion for ReqwestCompletion {
    async fn complete(&self, conversation: &Conversation, model: &str) -> Result<String, Error> {
        let response = self.request(conversation, model, false)?.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(openai::error_from_body(status.as_u16(), &body));
        }

        let completion: ChatCompletion = openai::deserialize_response(&body)?;
        completion.into_text().ok_or(Error::EmptyResponse)
    }

    fn stream(&self, conversation: &Conversation, model: &str) -> FragmentStream {
        let source = self
            .request(conversation, model, true)
            .and_then(|builder| {
                EventSource::new(builder).map_err(|err| Error::InvalidRequest(err.to_string()))
            });

        let mut source = match source {
            Ok(source) => source,
            Err(err) => return stream::once(async move { Err::<Option<String>, _>(err) }).boxed(),
        };
        source.set_retry_policy(Box::new(Never));

        stream::unfold(Some(source), |state| async move {
            let mut source = state?;
            loop {
                match source.next().await {
                    None => return None,
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => match openai::parse_stream_data(&message.data) {
                        Ok(StreamData::Fragment(fragment)) => return Some((Ok(fragment), Some(source))),
                        Ok(StreamData::Done) => {
                            source.close();
                            return None;
                        }
                        Err(err) => {
                            source.close();
                            return Some((Err(err), None));
                        }
                    },
                    Some(Err(err)) => {
                        source.close();
                        return Some((Err(stream_error(err).await), None));
                    }
                }
            }
        })
        .boxed()
    }
}

/// Maps an event source failure to a crate error, reading error bodies where there are any.
async fn stream_error(err: reqwest_eventsource::Error) -> Error {
    use reqwest_eventsource::Error as SourceError;

    match err {
        SourceError::Transport(err) => Error::from(err),
        SourceError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            openai::error_from_body(status.as_u16(), &body)
        }
        SourceError::StreamEnded => Error::StreamEnded,
        other => Error::Stream(other.to_string()),
    }
}
