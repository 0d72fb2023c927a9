//! `surveyvault` - Anonymizing questionnaire intake
//!
//! This library accepts questionnaire submissions, validates them, and
//! persists each one as two disjoint artifacts: an anonymized record keyed by
//! a random identity, and a single `<identity>: <name>` line in an
//! append-only identity ledger.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod submission;
pub mod validate;

pub use config::Config;
pub use error::{Error, Result};
pub use identity::SubmissionIdentity;
pub use ledger::{FileLedger, IdentityLedger, LedgerEntry};
pub use logging::init_logging;
pub use pipeline::{Receipt, SubmissionPipeline, SubmitError};
pub use store::{RecordStore, StoreBackend};
pub use submission::{AnonymizedRecord, RawSubmission};
pub use validate::{Validator, Violation};
