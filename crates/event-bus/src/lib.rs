//! Asynchronous propagation of committed events.
//!
//! - [`EventBus`]: subscription-based fan-out with per-aggregate ordering and
//!   at-least-once delivery
//! - [`DeadLetterQueue`]: events a handler could not process after retries
//! - [`OutboxRelay`]: moves committed events from the write repository's
//!   outbox onto the bus

pub mod bus;
pub mod dead_letter;
pub mod error;
pub mod handler;
pub mod relay;

pub use bus::{BusConfig, EventBus, SubscriptionId};
pub use dead_letter::{DeadLetter, DeadLetterQueue, InMemoryDeadLetterQueue};
pub use error::{BusError, RelayError};
pub use handler::{EventFilter, EventHandler, HandlerError};
pub use relay::{OutboxRelay, RelayConfig, RelayHandle};
