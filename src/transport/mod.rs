//! The `transport` module talks to the broker.
//!
//! [`Connector`] provisions the topic and subscription, keeps several
//! receives outstanding at once, packs and unpacks the wire envelope and
//! pushes every send through a [`RetryPolicy`].

pub mod connector;
pub mod retry;

pub use connector::{Connector, ConnectorOptions, unpack};
pub use retry::RetryPolicy;
