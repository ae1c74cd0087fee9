//! Named event dispatch for Herald.
//!
//! Events are resolved against a closed [`HandlerRegistry`] populated at
//! startup. A resolved event constructs a fresh handler and invokes it once;
//! an unknown event name is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, trace};

/// Handler errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    /// A positional argument was not supplied.
    #[error("Missing argument at position {index}")]
    MissingArgument { index: usize },

    /// A positional argument had the wrong type.
    #[error("Argument at position {index} should be {expected}, got {found}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// The handler ran and failed.
    #[error("Handler failed: {0}")]
    Failed(String),
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Event names cannot be empty.
    #[error("Event name cannot be empty")]
    EmptyName,

    /// A handler is already registered under this name.
    #[error("Handler already registered: {0}")]
    Duplicate(String),
}

/// A single event argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl Arg {
    /// Name of the argument's type, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Arg::Bool(_) => "boolean",
            Arg::Int(_) | Arg::UInt(_) => "integer",
            Arg::Float(_) => "float",
            Arg::Text(_) => "text",
            Arg::Json(_) => "json",
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Bool(b) => write!(f, "{b}"),
            Arg::Int(n) => write!(f, "{n}"),
            Arg::UInt(n) => write!(f, "{n}"),
            Arg::Float(x) => write!(f, "{x:?}"),
            Arg::Text(s) => write!(f, "{s:?}"),
            Arg::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Int(n)
    }
}

impl From<i32> for Arg {
    fn from(n: i32) -> Self {
        Arg::Int(i64::from(n))
    }
}

impl From<u64> for Arg {
    fn from(n: u64) -> Self {
        Arg::UInt(n)
    }
}

impl From<f64> for Arg {
    fn from(x: f64) -> Self {
        Arg::Float(x)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl From<serde_json::Value> for Arg {
    fn from(v: serde_json::Value) -> Self {
        Arg::Json(v)
    }
}

/// Ordered event arguments, forwarded to the handler as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    args: Vec<Arg>,
}

impl Payload {
    /// Create an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument.
    #[must_use]
    pub fn with(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check if there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// All arguments in order.
    #[must_use]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Get the argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::MissingArgument`] if there is no such argument.
    pub fn get(&self, index: usize) -> Result<&Arg, HandlerError> {
        self.args
            .get(index)
            .ok_or(HandlerError::MissingArgument { index })
    }

    /// Get an integer argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing, not an integer, or
    /// above `i64::MAX`.
    pub fn int(&self, index: usize) -> Result<i64, HandlerError> {
        match self.get(index)? {
            Arg::Int(n) => Ok(*n),
            Arg::UInt(n) => i64::try_from(*n).map_err(|_| HandlerError::ArgumentType {
                index,
                expected: "integer",
                found: "unsigned integer",
            }),
            other => Err(mismatch(index, "integer", other)),
        }
    }

    /// Get a float argument. Integers are widened.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or not numeric.
    pub fn float(&self, index: usize) -> Result<f64, HandlerError> {
        match self.get(index)? {
            Arg::Float(x) => Ok(*x),
            Arg::Int(n) => Ok(*n as f64),
            Arg::UInt(n) => Ok(*n as f64),
            other => Err(mismatch(index, "float", other)),
        }
    }

    /// Get a boolean argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or not a boolean.
    pub fn bool(&self, index: usize) -> Result<bool, HandlerError> {
        match self.get(index)? {
            Arg::Bool(b) => Ok(*b),
            other => Err(mismatch(index, "boolean", other)),
        }
    }

    /// Get a text argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or not text.
    pub fn text(&self, index: usize) -> Result<&str, HandlerError> {
        match self.get(index)? {
            Arg::Text(s) => Ok(s),
            other => Err(mismatch(index, "text", other)),
        }
    }

    /// Get an identifier argument, given either as text or as an integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument is missing or of another type.
    pub fn identifier(&self, index: usize) -> Result<String, HandlerError> {
        match self.get(index)? {
            Arg::Text(s) => Ok(s.clone()),
            Arg::Int(n) => Ok(n.to_string()),
            Arg::UInt(n) => Ok(n.to_string()),
            other => Err(mismatch(index, "identifier", other)),
        }
    }
}

fn mismatch(index: usize, expected: &'static str, found: &Arg) -> HandlerError {
    HandlerError::ArgumentType {
        index,
        expected,
        found: found.kind(),
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<Arg>> for Payload {
    fn from(args: Vec<Arg>) -> Self {
        Self { args }
    }
}

impl<A: Into<Arg>> FromIterator<A> for Payload {
    fn from_iter<T: IntoIterator<Item = A>>(iter: T) -> Self {
        Self {
            args: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A handler for one kind of event.
///
/// A new instance is constructed for every dispatch.
pub trait EventHandler: Send {
    /// Process the event's arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are unusable or processing fails.
    fn handle(&mut self, payload: &Payload) -> Result<(), HandlerError>;
}

type Factory = Arc<dyn Fn() -> Box<dyn EventHandler> + Send + Sync>;

/// Closed mapping from event names to handler factories.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, Factory>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for an event name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or already registered.
    pub fn register<F, H>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: EventHandler + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.factories.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        trace!(event = %name, "Registered handler");
        let factory: Factory = Arc::new(move || Box::new(factory()) as Box<dyn EventHandler>);
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Register a handler type constructed with [`Default`].
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or already registered.
    pub fn register_default<H>(&mut self, name: impl Into<String>) -> Result<(), RegistryError>
    where
        H: EventHandler + Default + 'static,
    {
        self.register(name, H::default)
    }

    /// Check if an event name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered event names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn build(&self, name: &str) -> Option<Box<dyn EventHandler>> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("events", &self.names())
            .finish()
    }
}

/// Sink for the record written on every dispatch.
pub trait EventLog: Send + Sync {
    /// Record that an event is about to be dispatched.
    fn record(&self, event: &str, payload: &Payload);
}

impl<L: EventLog + ?Sized> EventLog for Arc<L> {
    fn record(&self, event: &str, payload: &Payload) {
        (**self).record(event, payload);
    }
}

/// [`EventLog`] backed by `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn record(&self, event: &str, payload: &Payload) {
        info!(event = %event, payload = %payload, "Dispatching event");
    }
}

/// Result of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler was constructed and ran.
    Handled,
    /// No handler is registered for the event name.
    Ignored,
}

impl Dispatch {
    /// Lowercase label for logs and responses.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Dispatch::Handled => "handled",
            Dispatch::Ignored => "ignored",
        }
    }
}

/// Resolves event names and runs their handlers.
#[derive(Debug)]
pub struct Dispatcher<L = TracingLog> {
    registry: HandlerRegistry,
    log: L,
}

impl Dispatcher<TracingLog> {
    /// Create a dispatcher that logs through `tracing`.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::with_log(registry, TracingLog)
    }
}

impl<L: EventLog> Dispatcher<L> {
    /// Create a dispatcher with an explicit log sink.
    #[must_use]
    pub fn with_log(registry: HandlerRegistry, log: L) -> Self {
        Self { registry, log }
    }

    /// The handler registry.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Dispatch an event.
    ///
    /// The event is logged before it is resolved. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Returns the handler's error if it fails.
    pub fn dispatch(&self, event: &str, payload: &Payload) -> Result<Dispatch, HandlerError> {
        self.log.record(event, payload);

        let Some(mut handler) = self.registry.build(event) else {
            trace!(event = %event, "No handler registered, ignoring");
            return Ok(Dispatch::Ignored);
        };

        handler.handle(payload)?;
        Ok(Dispatch::Handled)
    }
}
