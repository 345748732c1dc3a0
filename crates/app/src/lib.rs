//! Command/query gateway and runtime assembly for the CQRS engine.
//!
//! Adapters talk to the engine only through [`Gateway`], using the JSON
//! contracts in [`contract`]. [`Runtime`] wires the write store, outbox relay,
//! event bus, projection updater and read store behind it.

pub mod config;
pub mod contract;
pub mod error;
pub mod gateway;
pub mod lines;
pub mod runtime;

pub use config::{Config, LogFormat};
pub use contract::{
    CommandRequest, CommandResponse, QueryRequest, QueryResponse, Request, Response,
};
pub use error::GatewayError;
pub use gateway::{COMMAND_TYPES, Gateway, QUERY_TYPES};
pub use runtime::{EngineGateway, Runtime, Views};
