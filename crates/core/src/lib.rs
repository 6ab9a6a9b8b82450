//! `flowable-core`: foundation types shared by every engine crate.
//!
//! This crate has no execution logic: it defines the error taxonomy,
//! identifiers and the per-invocation `CommandConfig`.

pub mod config;
pub mod error;
pub mod id;

pub use config::{CommandConfig, TransactionPropagation};
pub use error::{FlowableError, FlowableResult};
pub use id::{ContextId, TransactionId};
