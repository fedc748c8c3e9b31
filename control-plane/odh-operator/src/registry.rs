//! Pluggable service and component handlers.
//!
//! Registries are built explicitly by the entry point before the operator
//! is created and are read-only afterwards.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::{cluster::Platform, manager::Manager};

/// An extension unit that owns one or more reconcilers.
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    /// Platform-conditional configuration. No cluster I/O.
    fn init(&self, platform: Platform) -> anyhow::Result<()>;

    /// Register the handler's watch loop(s) with the manager.
    fn new_reconciler(&self, manager: &mut Manager) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Service,
    Component,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandlerKind::Service => "service",
            HandlerKind::Component => "component",
        })
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} handler {name:?} registered twice")]
    Duplicate { kind: HandlerKind, name: String },
}

#[derive(Debug, Error)]
#[error("{kind} handler {name:?}: {source:#}")]
pub struct HandlerError {
    pub kind: HandlerKind,
    pub name: String,
    #[source]
    pub source: anyhow::Error,
}

pub struct HandlerRegistry {
    kind: HandlerKind,
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            handlers: Vec::new(),
        }
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Append a handler. Names are unique within a registry.
    pub fn register(
        &mut self,
        handler: Box<dyn Handler>,
    ) -> Result<(), RegistryError> {
        if self.handlers.iter().any(|h| h.name() == handler.name()) {
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name: handler.name().to_string(),
            });
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// Apply `f` to each handler in registration order, stopping at the
    /// first failure.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), HandlerError>
    where
        F: FnMut(&dyn Handler) -> anyhow::Result<()>,
    {
        for handler in &self.handlers {
            f(handler.as_ref()).map_err(|source| HandlerError {
                kind: self.kind,
                name: handler.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kind", &self.kind)
            .field("handlers", &self.names())
            .finish()
    }
}

/// The two registries the operator drives, services first.
#[derive(Debug)]
pub struct Handlers {
    pub services: HandlerRegistry,
    pub components: HandlerRegistry,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            services: HandlerRegistry::new(HandlerKind::Service),
            components: HandlerRegistry::new(HandlerKind::Component),
        }
    }
}

impl Handlers {
    /// Services, then components.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), HandlerError>
    where
        F: FnMut(&dyn Handler) -> anyhow::Result<()>,
    {
        self.services.for_each(&mut f)?;
        self.components.for_each(&mut f)
    }
}

/// The handler set the operator binary runs with. Service and component
/// handlers register here, in the order they are initialized and wired;
/// none ship with the bootstrap core.
pub fn default_handlers() -> Handlers {
    let handlers = Handlers::default();
    debug!(
        services = ?handlers.services.names(),
        components = ?handlers.components.names(),
        "handlers registered"
    );
    handlers
}
