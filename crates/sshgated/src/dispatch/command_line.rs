//! Parsing of the exec payload into a command name and argument string.

use super::errors::DispatchError;

/// An exec payload split into its command name and opaque remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    raw: String,
    command: String,
    args: String,
}

impl ExecRequest {
    /// Parses an exec payload.
    ///
    /// The payload must be UTF-8. Surrounding whitespace is ignored; the first
    /// whitespace-delimited token is the command name and everything after
    /// the following run of whitespace is the argument string, passed on
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MalformedCommand`] for non-UTF-8 or blank
    /// payloads.
    pub fn parse(payload: &[u8]) -> Result<Self, DispatchError> {
        let text = std::str::from_utf8(payload).map_err(|error| {
            DispatchError::malformed(format!("command line is not UTF-8: {error}"))
        })?;
        let raw = text.trim();
        if raw.is_empty() {
            return Err(DispatchError::malformed("empty command line"));
        }

        let (command, args) = raw
            .split_once(char::is_whitespace)
            .map_or((raw, ""), |(command, rest)| (command, rest.trim_start()));
        Ok(Self {
            raw: raw.to_owned(),
            command: command.to_owned(),
            args: args.to_owned(),
        })
    }

    /// Trimmed command line.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Command name.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Remainder after the command name.
    #[must_use]
    pub fn args(&self) -> &str {
        &self.args
    }
}
