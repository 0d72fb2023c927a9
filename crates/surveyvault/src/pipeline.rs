//! The submission pipeline.
//!
//! Drives one submission through
//! `Received → Validated → IdentityAssigned → AnonymizedWritten → LedgerWritten → Acknowledged`,
//! or into `Rejected` when validation fails. The anonymized record is always
//! written before the ledger entry, so a partial failure can at worst leave
//! an unattributable record, never a ledger line pointing at nothing. There
//! is no rollback and no retry.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::identity::SubmissionIdentity;
use crate::ledger::{FileLedger, IdentityLedger, LedgerEntry};
use crate::store::{open_store, RecordStore};
use crate::submission::RawSubmission;
use crate::validate::{Validator, Violation};

/// Processing stage of a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The raw submission has arrived.
    Received,
    /// Every field passed validation.
    Validated,
    /// A fresh identity has been drawn.
    IdentityAssigned,
    /// The anonymized record is durable.
    AnonymizedWritten,
    /// The ledger entry is durable.
    LedgerWritten,
    /// The caller has been told the submission succeeded.
    Acknowledged,
    /// Validation failed; nothing was written.
    Rejected,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::IdentityAssigned => "identity_assigned",
            Self::AnonymizedWritten => "anonymized_written",
            Self::LedgerWritten => "ledger_written",
            Self::Acknowledged => "acknowledged",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Why a submission did not reach `Acknowledged`.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// One or more fields violated their constraints. No side effects.
    #[error("submission rejected with {} violation(s)", .0.len())]
    Rejected(Vec<Violation>),

    /// The entropy source failed. Fatal to the process; not retried.
    #[error("identity generation failed: {0}")]
    Identity(#[source] Error),

    /// The anonymized record could not be persisted. No ledger entry exists.
    #[error("anonymized record write failed: {0}")]
    AnonymizedWrite(#[source] Error),

    /// The ledger append failed after the record was written. The record
    /// under `identity` remains and is now unattributable.
    #[error("ledger append failed for {identity}: {source}")]
    LedgerWrite {
        /// Identity of the orphaned record.
        identity: SubmissionIdentity,
        /// The underlying error.
        #[source]
        source: Error,
    },
}

impl SubmitError {
    /// Whether the process should stop accepting submissions.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Identity(_))
    }
}

/// Proof that a submission was fully recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Identity the submission was stored under.
    pub identity: SubmissionIdentity,
}

/// Sequences validation, identity assignment and both writes.
#[derive(Debug, Clone)]
pub struct SubmissionPipeline {
    validator: Validator,
    records: Arc<dyn RecordStore>,
    ledger: Arc<dyn IdentityLedger>,
}

impl SubmissionPipeline {
    /// Assemble a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        validator: Validator,
        records: Arc<dyn RecordStore>,
        ledger: Arc<dyn IdentityLedger>,
    ) -> Self {
        Self {
            validator,
            records,
            ledger,
        }
    }

    /// Open the configured record store and ledger and assemble a pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if either the record store or the ledger cannot be
    /// opened.
    pub async fn open(config: &Config) -> crate::error::Result<Self> {
        let records = open_store(config)?;
        let ledger_path = config.ledger_path();
        let ledger = FileLedger::open(&ledger_path).await?;

        info!(
            backend = records.backend_name(),
            ledger = %ledger_path.display(),
            "Submission pipeline ready"
        );
        Ok(Self::new(
            Validator::new(config.validator_config()),
            records,
            Arc::new(ledger),
        ))
    }

    /// The record store this pipeline writes to.
    #[must_use]
    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Process one submission to completion.
    ///
    /// Returns only after both writes have been attempted.
    ///
    /// # Errors
    ///
    /// See [`SubmitError`] for the outcome of each failure path.
    pub async fn submit(&self, raw: &RawSubmission) -> Result<Receipt, SubmitError> {
        debug!(stage = %Stage::Received, "Submission received");

        let validated = match self.validator.validate(raw) {
            Ok(validated) => validated,
            Err(violations) => {
                let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
                debug!(stage = %Stage::Rejected, ?fields, "Submission rejected");
                return Err(SubmitError::Rejected(violations));
            }
        };
        debug!(stage = %Stage::Validated, "Submission validated");

        let identity = SubmissionIdentity::generate().map_err(|e| {
            error!(error = %e, "Entropy source failed; refusing further submissions");
            SubmitError::Identity(e)
        })?;
        debug!(stage = %Stage::IdentityAssigned, identity = %identity, "Identity assigned");

        let (record, name) = validated.split();

        if let Err(e) = self.records.put(&identity, &record).await {
            error!(identity = %identity, error = %e, "Anonymized record write failed");
            return Err(SubmitError::AnonymizedWrite(e));
        }
        debug!(stage = %Stage::AnonymizedWritten, identity = %identity, "Record written");

        let entry = LedgerEntry::new(identity.clone(), name);
        if let Err(e) = self.ledger.append(&entry).await {
            warn!(
                identity = %identity,
                error = %e,
                "Ledger append failed; record is now unattributable"
            );
            return Err(SubmitError::LedgerWrite {
                identity,
                source: e,
            });
        }
        debug!(stage = %Stage::LedgerWritten, identity = %identity, "Ledger entry written");

        debug!(stage = %Stage::Acknowledged, identity = %identity, "Submission acknowledged");
        Ok(Receipt { identity })
    }
}
