//! Conversation state and its on-disk form.
//!
//! A [`Conversation`] is an ordered, append-only list of [`Turn`]s. It is replayed verbatim to
//! the completion API on every request, so order matters and past turns are never edited.
//!
//! ## Persistence
//!
//! On disk a conversation is a flat JSON array of `{"role": ..., "content": ...}` objects,
//! pretty-printed with a two-space indent. [`Conversation::read`] and [`Conversation::write`]
//! report failures to the caller, while [`Conversation::load`] and [`Conversation::save`] log
//! them and degrade (an empty conversation, or a `false` return) so an interactive session can
//! always start and always exit.
//!
//! ## Example
//!
//! ```
//! use parley::conversation::{Conversation, Role};
//!
//! let mut conversation = Conversation::new();
//! conversation.push_user("Hello");
//! conversation.push_assistant("Hi there");
//!
//! let mut buffer = Vec::new();
//! conversation.to_json(&mut buffer).unwrap();
//!
//! let restored = Conversation::from_json(&buffer[..]).unwrap();
//! assert_eq!(restored, conversation);
//! assert_eq!(restored.turns()[1].role(), Role::Assistant);
//! ```

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// A role in a conversation.
///
/// The client only ever produces `user` and `assistant` turns, `system` is accepted when loading
/// a conversation written by something else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

/// A single message in a conversation.
///
/// Turns have no setters, once created they stay as they are.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    /// Creates a turn with the given role.
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a user turn.
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant turn.
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// A failure reading or writing a conversation file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid conversation JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether the file simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// An ordered, append-only sequence of turns.
///
/// Backed by a persistent vector, so cloning a conversation to build a request is cheap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: im::Vector<Turn>,
}

impl Conversation {
    /// Creates an empty conversation.
    pub fn new() -> Self {
        Self {
            turns: im::Vector::new(),
        }
    }

    /// Appends a user turn.
    pub fn push_user<S: Into<String>>(&mut self, content: S) -> &mut Self {
        self.turns.push_back(Turn::user(content));
        self
    }

    /// Appends an assistant turn.
    pub fn push_assistant<S: Into<String>>(&mut self, content: S) -> &mut Self {
        self.turns.push_back(Turn::assistant(content));
        self
    }

    /// Returns a copy of this conversation extended by one user turn.
    ///
    /// `self` is left untouched, which lets a caller send a pending round and only commit it
    /// once a reply is available.
    pub fn with_user<S: Into<String>>(&self, content: S) -> Self {
        let mut pending = self.clone();
        pending.push_user(content);
        pending
    }

    /// Returns the turns in order.
    pub fn turns(&self) -> &im::Vector<Turn> {
        &self.turns
    }

    pub fn iter(&self) -> im::vector::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Serializes the conversation as pretty-printed JSON using the provided writer.
    pub fn to_json<W: io::Write>(&self, writer: W) -> Result<(), serde_json::Error> {
        serde_json::to_writer_pretty(writer, self)
    }

    /// Deserializes a conversation from JSON using the provided reader.
    pub fn from_json<R: io::Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }

    /// Reads a conversation file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        })
    }

    /// Writes the conversation to a file, replacing its contents.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        })?;

        fs::write(path, json).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })
    }

    /// Loads a conversation file, falling back to an empty conversation on any error.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        match Self::read(&path) {
            Ok(conversation) => {
                tracing::debug!(
                    path = %path.as_ref().display(),
                    turns = conversation.len(),
                    "loaded conversation"
                );
                conversation
            }
            Err(err) => {
                tracing::warn!("{err}, starting with an empty conversation");
                Self::new()
            }
        }
    }

    /// Saves the conversation, logging instead of returning errors.
    ///
    /// Returns whether the file was written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> bool {
        match self.write(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.as_ref().display(), turns = self.len(), "saved conversation");
                true
            }
            Err(err) => {
                tracing::warn!("{err}");
                false
            }
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Turn;
    type IntoIter = im::vector::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
