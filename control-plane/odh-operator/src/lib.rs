pub mod bootstrap;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod manager;
pub mod registry;
pub mod scheme;
pub mod startup;
#[cfg(test)]
mod testing;
pub mod webhook;

pub use bootstrap::{Factory, Operator, OperatorKind, OperatorState};
pub use config::{Config, OperatorConfig};
pub use error::Error;
pub use registry::{Handler, Handlers};
