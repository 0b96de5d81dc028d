//! Transaction coordination.
//!
//! Three scopes exist: a single operation on a pooled connection (see
//! [`crate::Engine::execute`]), a batch of operations in one transaction,
//! and an interactive transaction pinning a connection for the lifetime
//! of a caller closure through a [`TransactionClient`].

mod client;
mod coordinator;
mod retry;

pub use client::TransactionClient;
pub(crate) use retry::with_retry;
