//! Identifiers for contexts and transactions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FlowableError;

/// Identifier of one command context (one unit of work).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

/// Identifier of one transaction opened by a transaction manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

macro_rules! uuid_id {
    ($t:ty, $label:literal) => {
        impl $t {
            /// Time-ordered (v7), so ids sort by creation in logs.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $t {
            type Err = FlowableError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| FlowableError::illegal_argument(format!("{} {s:?}: {e}", $label)))
            }
        }
    };
}

uuid_id!(ContextId, "ContextId");
uuid_id!(TransactionId, "TransactionId");
