//! Routes: named pipelines of steps with declared parameter bindings.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::context::{ContextValue, RequestContext, keys};

/// Failure raised by a single step.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError {
    /// A parameter the step requires was neither bound nor defaulted.
    #[error("missing parameter '{name}'")]
    MissingParameter {
        /// Parameter name as declared in the binding.
        name: String,
    },
    /// A parameter held a value of the wrong type.
    #[error("parameter '{name}' must be {expected}, found {found}")]
    InvalidParameter {
        /// Parameter name as declared in the binding.
        name: String,
        /// Expected value kind.
        expected: &'static str,
        /// Kind actually stored.
        found: &'static str,
    },
    /// The step ran and reported a failure.
    #[error("{message}")]
    Failed {
        /// Message shown to the client.
        message: String,
    },
}

impl StepError {
    /// Creates a generic step failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Work performed by one step of a route.
///
/// Handlers see only the parameters their step declares and hand back the
/// values they want published into the request context. Any
/// `Fn(&Params) -> Result<Published, StepError>` closure is a handler.
pub trait StepHandler: Send + Sync {
    /// Runs the step.
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`] to abort the remaining pipeline.
    fn call(&self, params: &Params) -> Result<Published, StepError>;
}

impl<F> StepHandler for F
where
    F: Fn(&Params) -> Result<Published, StepError> + Send + Sync,
{
    fn call(&self, params: &Params) -> Result<Published, StepError> {
        self(params)
    }
}

/// Parameters resolved for one step invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: HashMap<String, ContextValue>,
}

impl Params {
    /// Builds parameters directly, bypassing binding resolution.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = (String, ContextValue)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Looks up a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.values.get(name)
    }

    /// Looks up a parameter that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::MissingParameter`] when it is absent.
    pub fn require(&self, name: &str) -> Result<&ContextValue, StepError> {
        self.get(name).ok_or_else(|| StepError::MissingParameter {
            name: name.to_owned(),
        })
    }

    /// Looks up a required text parameter.
    ///
    /// # Errors
    ///
    /// Returns an error when the parameter is absent or not text.
    pub fn text(&self, name: &str) -> Result<&str, StepError> {
        let value = self.require(name)?;
        value
            .as_text()
            .ok_or_else(|| invalid(name, "text", value))
    }

    /// Looks up a required map parameter.
    ///
    /// # Errors
    ///
    /// Returns an error when the parameter is absent or not a map.
    pub fn map(&self, name: &str) -> Result<&BTreeMap<String, String>, StepError> {
        let value = self.require(name)?;
        value.as_map().ok_or_else(|| invalid(name, "map", value))
    }

    /// Number of resolved parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when no parameter resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn invalid(name: &str, expected: &'static str, found: &ContextValue) -> StepError {
    StepError::InvalidParameter {
        name: name.to_owned(),
        expected,
        found: found.kind(),
    }
}

/// Values a step publishes into the request context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Published {
    entries: Vec<(String, ContextValue)>,
}

impl Published {
    /// Publishes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value under `key`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Publishes the response body under [`keys::OUTPUT`].
    #[must_use]
    pub fn output(self, body: impl Into<Vec<u8>>) -> Self {
        self.with(keys::OUTPUT, ContextValue::bytes(body))
    }

    /// Returns true when nothing is published.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(String, ContextValue)> {
        self.entries
    }
}

/// Maps a step parameter to the context key it is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    param: String,
    source: String,
    default: Option<ContextValue>,
}

impl Binding {
    /// Parameter name the handler sees.
    #[must_use]
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Context key the value is read from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// One named stage of a route pipeline.
#[derive(Clone)]
pub struct Step {
    name: String,
    handler: Arc<dyn StepHandler>,
    bindings: Vec<Binding>,
}

impl Step {
    /// Creates a step with no bindings.
    #[must_use]
    pub fn new(name: impl Into<String>, handler: impl StepHandler + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            bindings: Vec::new(),
        }
    }

    /// Binds parameter `param` to context key `source`.
    #[must_use]
    pub fn bind(self, param: impl Into<String>, source: impl Into<String>) -> Self {
        self.push_binding(param.into(), source.into(), None)
    }

    /// Binds `param` to `source`, falling back to `default` when the key is
    /// absent.
    #[must_use]
    pub fn bind_or(
        self,
        param: impl Into<String>,
        source: impl Into<String>,
        default: impl Into<ContextValue>,
    ) -> Self {
        self.push_binding(param.into(), source.into(), Some(default.into()))
    }

    fn push_binding(mut self, param: String, source: String, default: Option<ContextValue>) -> Self {
        self.bindings.push(Binding {
            param,
            source,
            default,
        });
        self
    }

    /// Step name, reported when the step fails.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared bindings, in declaration order.
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Reads the declared parameters out of `context`. Unbound keys without a
    /// default are left out; the handler decides whether that is an error.
    pub(crate) fn resolve(&self, context: &RequestContext) -> Params {
        let values = self.bindings.iter().filter_map(|binding| {
            context
                .get(&binding.source)
                .or(binding.default.as_ref())
                .map(|value| (binding.param.clone(), value.clone()))
        });
        Params::from_values(values)
    }

    pub(crate) fn run(&self, context: &RequestContext) -> Result<Published, StepError> {
        self.handler.call(&self.resolve(context))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Step")
            .field("name", &self.name)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

/// Named, ordered pipeline bound to a command name.
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    help: String,
    steps: Vec<Step>,
}

impl Route {
    /// Creates a route with no steps.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step to the pipeline.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Command name that selects this route.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description shown by `help`.
    #[must_use]
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}
