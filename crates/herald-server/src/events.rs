//! Event handlers registered by the server at startup.

use herald_core::{
    EventHandler, HandlerError, HandlerRegistry, InMemoryDirectory, Payload, RegistryError, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Logs its arguments.
pub const GENERIC_EVENT: &str = "GenericEvent";
/// `(user_id, connection_id)`: the user opened a connection.
pub const CONNECTION_OPENED: &str = "ConnectionOpened";
/// `(user_id, connection_id)`: the user closed a connection.
pub const CONNECTION_CLOSED: &str = "ConnectionClosed";

/// Build the server's handler registry.
///
/// # Errors
///
/// Returns an error if two handlers share a name.
pub fn registry(directory: Arc<InMemoryDirectory>) -> Result<HandlerRegistry, RegistryError> {
    let mut registry = HandlerRegistry::new();

    registry.register_default::<GenericEvent>(GENERIC_EVENT)?;

    let opened = directory.clone();
    registry.register(CONNECTION_OPENED, move || ConnectionOpened {
        directory: opened.clone(),
    })?;

    registry.register(CONNECTION_CLOSED, move || ConnectionClosed {
        directory: directory.clone(),
    })?;

    Ok(registry)
}

#[derive(Debug, Default)]
pub struct GenericEvent;

impl EventHandler for GenericEvent {
    fn handle(&mut self, payload: &Payload) -> Result<(), HandlerError> {
        debug!(args = payload.len(), payload = %payload, "Generic event");
        Ok(())
    }
}

pub struct ConnectionOpened {
    directory: Arc<InMemoryDirectory>,
}

impl EventHandler for ConnectionOpened {
    fn handle(&mut self, payload: &Payload) -> Result<(), HandlerError> {
        let user = UserId::from(payload.identifier(0)?);
        let connection = payload.identifier(1)?;
        self.directory.open_connection(&user, &connection);
        Ok(())
    }
}

pub struct ConnectionClosed {
    directory: Arc<InMemoryDirectory>,
}

impl EventHandler for ConnectionClosed {
    fn handle(&mut self, payload: &Payload) -> Result<(), HandlerError> {
        let user = UserId::from(payload.identifier(0)?);
        let connection = payload.identifier(1)?;
        self.directory.close_connection(&user, &connection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{ConnectionDirectory, Dispatch, Dispatcher};

    #[test]
    fn test_registry_names() {
        let registry = registry(Arc::new(InMemoryDirectory::new())).unwrap();
        assert_eq!(
            registry.names(),
            vec![CONNECTION_CLOSED, CONNECTION_OPENED, GENERIC_EVENT]
        );
    }

    #[test]
    fn test_connection_lifecycle_events() {
        let directory = Arc::new(InMemoryDirectory::new());
        let dispatcher = Dispatcher::new(registry(directory.clone()).unwrap());
        let user = UserId::from("42");

        let opened = Payload::new().with(42).with("7");
        assert_eq!(
            dispatcher.dispatch(CONNECTION_OPENED, &opened),
            Ok(Dispatch::Handled)
        );
        assert!(directory.has_connection(&user, "7"));

        let closed = Payload::new().with("42").with(7);
        dispatcher.dispatch(CONNECTION_CLOSED, &closed).unwrap();
        assert!(!directory.has_connection(&user, "7"));
    }

    #[test]
    fn test_connection_event_requires_arguments() {
        let directory = Arc::new(InMemoryDirectory::new());
        let dispatcher = Dispatcher::new(registry(directory.clone()).unwrap());

        assert_eq!(
            dispatcher.dispatch(CONNECTION_OPENED, &Payload::new().with(42)),
            Err(HandlerError::MissingArgument { index: 1 })
        );
        assert!(matches!(
            dispatcher.dispatch(CONNECTION_OPENED, &Payload::new().with(true).with(1)),
            Err(HandlerError::ArgumentType { index: 0, .. })
        ));
        assert_eq!(directory.connection_count(), 0);
    }

    #[test]
    fn test_generic_event() {
        let dispatcher = Dispatcher::new(registry(Arc::new(InMemoryDirectory::new())).unwrap());
        assert_eq!(
            dispatcher.dispatch(GENERIC_EVENT, &Payload::new().with(10)),
            Ok(Dispatch::Handled)
        );
    }
}
