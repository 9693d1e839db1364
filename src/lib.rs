//! # rmaledger - RMA records on a key-value ledger
//!
//! rmaledger keeps return/repair (RMA) workflow records inside a shared
//! key-value ledger that only offers get, put, delete and prefix scans. Each
//! record lives under a composite key built from an index name and its record
//! number, and each party in the workflow updates its own section of it.
//!
//! ## Core Concepts
//!
//! - **Ledger**: the host's key-value primitives ([`Ledger`])
//! - **Composite key**: collision-free `index + record number` key ([`CompositeKey`])
//! - **Record store**: load/save/scan of decoded records ([`RecordStore`])
//! - **Update engine**: the closed set of section updates ([`UpdateEngine`])
//! - **Dispatcher**: function-name routing with structured responses ([`Dispatcher`])
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rmaledger::{Dispatcher, EngineConfig, MemoryLedger};
//!
//! let dispatcher = Dispatcher::new(Arc::new(MemoryLedger::new()), EngineConfig::default())?;
//!
//! assert!(dispatcher.invoke("create", &["RMA-1"]).is_ok());
//! assert!(dispatcher.invoke("update3b11", &["RMA-1", "PO1", "L1", "SKU1", "5"]).is_ok());
//!
//! let response = dispatcher.invoke::<&str>("query", &[]);
//! let records: Vec<rmaledger::Rma> = serde_json::from_slice(&response.payload.unwrap())?;
//! assert_eq!(records[0].intake.product_id, "SKU1");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod key;
pub mod ledger;
pub mod rma;
pub mod store;

// Re-export primary types at crate root for convenience
pub use config::{ConcurrencyMode, EngineConfig, FeLocationRouting, DEFAULT_INDEX_NAME};
pub use dispatch::{Dispatcher, Function, Invocation, Response};
pub use engine::{Command, OperationKind, Outcome, UpdateEngine};
pub use error::{ErrorKind, RmaError, RmaResult};
pub use key::{derive_key, partial_key, split_key, CompositeKey, KeyError};
pub use ledger::{KeyValue, Ledger, LedgerCursor, LedgerError, MemoryLedger};
#[cfg(feature = "persistent")]
pub use ledger::{FileLedger, LedgerConfig};
pub use rma::{Confirmation, Intake, Rma, RmaNo, ShipmentStatus};
pub use store::{RecordScan, RecordStore};
