//! Obtaining the assistant's next turn.
//!
//! [`Completion`] is the seam to whatever produces replies, usually the HTTP client in
//! [`crate::client`]. A [`Driver`] binds a capability to a model and offers the two ways a session
//! asks for a reply: [`Driver::complete_sync`] waits for the whole text, while
//! [`Driver::complete_streaming`] hands every fragment to an observer as soon as it arrives.
//!
//! Neither call touches the conversation it is given, appending the reply is up to the caller.

use std::future::Future;

use futures::{StreamExt, stream::BoxStream};
use tracing::instrument;

use crate::{Error, conversation::Conversation};

/// A lazily produced, finite sequence of reply fragments.
///
/// `Ok(None)` and `Ok(Some(""))` stand for chunks without text. The sequence ends once the
/// capability signals completion.
pub type FragmentStream = BoxStream<'static, Result<Option<String>, Error>>;

/// Something that can continue a conversation.
pub trait Completion {
    /// Requests the complete reply in one response.
    fn complete(
        &self,
        conversation: &Conversation,
        model: &str,
    ) -> impl Future<Output = Result<String, Error>>;

    /// Requests the reply as a stream of fragments.
    fn stream(&self, conversation: &Conversation, model: &str) -> FragmentStream;
}

/// Issues completion requests for a fixed model.
#[derive(Debug)]
pub struct Driver<C> {
    capability: C,
    model: String,
}

impl<C: Completion> Driver<C> {
    pub fn new<S: Into<String>>(capability: C, model: S) -> Self {
        Self {
            capability,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn capability(&self) -> &C {
        &self.capability
    }

    /// Sends the whole conversation and returns the reply text.
    #[instrument(skip_all, fields(model = %self.model, turns = conversation.len()))]
    pub async fn complete_sync(&self, conversation: &Conversation) -> Result<String, Error> {
        let text = self.capability.complete(conversation, &self.model).await?;
        tracing::debug!(chars = text.len(), "completion received");
        Ok(text)
    }

    /// Sends the whole conversation and streams the reply.
    ///
    /// `on_fragment` is called once per non-empty fragment, in delivery order, before the next
    /// fragment is requested. The returned text is the concatenation of exactly those fragments.
    ///
    /// If the stream fails, the text received so far is returned inside
    /// [`Error::StreamInterrupted`].
    #[instrument(skip_all, fields(model = %self.model, turns = conversation.len()))]
    pub async fn complete_streaming<F>(
        &self,
        conversation: &Conversation,
        mut on_fragment: F,
    ) -> Result<String, Error>
    where
        F: FnMut(&str),
    {
        let mut fragments = self.capability.stream(conversation, &self.model);
        let mut text = String::new();

        while let Some(item) = fragments.next().await {
            match item {
                Ok(Some(fragment)) if !fragment.is_empty() => {
                    on_fragment(&fragment);
                    text.push_str(&fragment);
                }
                Ok(_) => {}
                Err(source) => {
                    tracing::debug!(chars = text.len(), "stream failed");
                    return Err(Error::StreamInterrupted {
                        partial: text,
                        source: Box::new(source),
                    });
                }
            }
        }

        tracing::debug!(chars = text.len(), "stream complete");
        Ok(text)
    }
}
