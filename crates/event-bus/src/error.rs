use thiserror::Error;
use write_store::WriteStoreError;

use crate::bus::SubscriptionId;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Event bus is shut down")]
    Closed,

    #[error("Event bus did not accept the events before the deadline")]
    Timeout,

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Write store error: {0}")]
    Store(#[from] WriteStoreError),

    #[error("Publish failed: {0}")]
    Publish(#[from] BusError),
}
