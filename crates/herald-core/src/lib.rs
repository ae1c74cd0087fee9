//! # herald-core
//!
//! Event dispatch and private-channel authorization for the Herald server.
//!
//! This crate provides the building blocks:
//!
//! - **Event** - Named events dispatched to handlers through a closed registry
//! - **Auth** - `private-<topic>-<id>` channel authorization
//! - **Directory** - Which connections belong to which user
//! - **Signature** - Pusher-compatible auth tokens for granted channels
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Event name │────▶│  Registry   │────▶│   Handler   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Channel   │────▶│ Authorizer  │────▶│  Directory  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! The two halves share no state.

pub mod auth;
pub mod directory;
pub mod event;
pub mod signature;

pub use auth::{Authorization, Authorizer, ChannelName, ConnectionDirectory, Topic, User, UserId};
pub use directory::InMemoryDirectory;
pub use event::{
    Arg, Dispatch, Dispatcher, EventHandler, EventLog, HandlerError, HandlerRegistry, Payload,
    RegistryError, TracingLog,
};
pub use signature::{AuthSigner, SignatureError};
