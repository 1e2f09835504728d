//! Request-scoped key/value store shared by the steps of one dispatch.
//!
//! Every exec request gets a fresh [`RequestContext`] seeded by the session
//! layer. Steps read it only through their declared bindings and write to it
//! only through the values they publish. The keys the gateway itself seeds
//! are listed in [`keys`].

use std::collections::{BTreeMap, HashMap};

use russh::ChannelId;

/// Keys with a fixed meaning in every [`RequestContext`].
pub mod keys {
    /// Exec command line with surrounding whitespace trimmed. Always present.
    pub const REQUEST: &str = "request";
    /// First whitespace-delimited token of the command line. Always present.
    pub const COMMAND: &str = "command";
    /// Remainder of the command line after the command name, with leading
    /// whitespace removed. Always present, possibly empty.
    pub const ARGS: &str = "args";
    /// Map of environment variables set on the channel before the exec.
    /// Always present, possibly empty.
    pub const ENV: &str = "env";
    /// Channel carrying the exec request. Always present.
    pub const CHANNEL: &str = "channel";
    /// Authenticated user name. Always present.
    pub const USER: &str = "user";
    /// SHA-256 fingerprint of the client key. Present only after public-key
    /// authentication.
    pub const FINGERPRINT: &str = "fingerprint";
    /// Map of every registered route name to its help text. Seeded by the
    /// router once the route is resolved.
    pub const ROUTES: &str = "routes";
    /// Response body. Written by steps; read back once the pipeline ends.
    pub const OUTPUT: &str = "output";
}

/// Typed value stored under a context key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextValue {
    /// UTF-8 text.
    Text(String),
    /// Arbitrary bytes.
    Bytes(Vec<u8>),
    /// Sorted string map, used for environments and route catalogues.
    Map(BTreeMap<String, String>),
    /// Reference to an SSH channel.
    Channel(ChannelId),
}

impl ContextValue {
    /// Builds a text value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Builds a bytes value.
    #[must_use]
    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(value.into())
    }

    /// Returns the text payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the payload as bytes for text and bytes values.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(text) => Some(text.as_bytes()),
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the map payload, if this is a map value.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the channel reference, if this is a channel value.
    #[must_use]
    pub const fn as_channel(&self) -> Option<ChannelId> {
        match self {
            Self::Channel(channel) => Some(*channel),
            _ => None,
        }
    }

    /// Short name of the variant, used in parameter type errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Map(_) => "map",
            Self::Channel(_) => "channel",
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<BTreeMap<String, String>> for ContextValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Map(value)
    }
}

/// Mutable key/value mapping exclusive to one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    values: HashMap<String, ContextValue>,
}

impl RequestContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning the value it replaced.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ContextValue>,
    ) -> Option<ContextValue> {
        self.values.insert(key.into(), value.into())
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    /// Looks up a text value.
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ContextValue::as_text)
    }

    /// Returns true when `key` holds a value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Body published under [`keys::OUTPUT`], or empty when none was.
    #[must_use]
    pub fn output(&self) -> Vec<u8> {
        self.get(keys::OUTPUT)
            .and_then(ContextValue::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    pub(crate) fn extend(&mut self, entries: impl IntoIterator<Item = (String, ContextValue)>) {
        self.values.extend(entries);
    }
}
