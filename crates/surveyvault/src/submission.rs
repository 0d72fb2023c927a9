//! Core submission types for surveyvault.
//!
//! A questionnaire response moves through three shapes: the untrusted
//! [`RawSubmission`] decoded from the request body, the [`ValidatedSubmission`]
//! produced by the validator, and finally the disjoint pair of an
//! [`AnonymizedRecord`] and a [`DeclaredName`] produced by
//! [`ValidatedSubmission::split`].

use serde::{Deserialize, Serialize};

/// An untrusted questionnaire response, exactly as decoded from the form.
///
/// Every field is optional so that a missing field can be reported as a
/// violation instead of a decoding failure. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawSubmission {
    /// Declared name.
    pub name: Option<String>,
    /// Age in years.
    pub age: Option<String>,
    /// Gender wire value.
    pub gender: Option<String>,
    /// Marital status wire value.
    #[serde(rename = "maritalStatus")]
    pub marital_status: Option<String>,
    /// Opinion on the topic.
    pub opinion: Option<String>,
    /// Religious perspective.
    pub religious_view: Option<String>,
    /// Cultural factors that apply.
    pub cultural_factors: Option<String>,
    /// Challenges faced.
    pub challenges: Option<String>,
    /// Perceived benefits.
    pub benefits: Option<String>,
    /// Sources of guidance.
    pub guidance: Option<String>,
    /// Observed societal changes.
    pub societal_changes: Option<String>,
}

/// Declared gender, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    /// Male.
    Male,
    /// Female.
    Female,
    /// Other.
    Other,
    /// The participant declined to answer.
    PreferNotToSay,
}

impl Gender {
    /// Every accepted value, in form order.
    pub const ALL: [Self; 4] = [Self::Male, Self::Female, Self::Other, Self::PreferNotToSay];

    /// The wire representation of this value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::PreferNotToSay => "prefer_not_to_say",
        }
    }

    /// Parse an exact wire value.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == value)
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared marital status, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaritalStatus {
    /// Single.
    Single,
    /// Married.
    Married,
    /// Divorced.
    Divorced,
    /// Widowed.
    Widowed,
}

impl MaritalStatus {
    /// Every accepted value, in form order.
    pub const ALL: [Self; 4] = [Self::Single, Self::Married, Self::Divorced, Self::Widowed];

    /// The wire representation of this value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Married => "married",
            Self::Divorced => "divorced",
            Self::Widowed => "widowed",
        }
    }

    /// Parse an exact wire value.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

impl std::fmt::Display for MaritalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant's declared name, already trimmed and escaped.
///
/// Kept apart from the record so it can only ever reach the identity ledger.
/// `Debug` is redacted so a stray log statement cannot leak it.
#[derive(Clone, PartialEq, Eq)]
pub struct DeclaredName(String);

impl DeclaredName {
    pub(crate) fn new(name: String) -> Self {
        Self(name)
    }

    /// The name as it will be written to the ledger.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DeclaredName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeclaredName(<redacted>)")
    }
}

/// The persisted half of a submission: every validated field except the name.
///
/// Serializes as a flat JSON object using the form's field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizedRecord {
    /// Age in years.
    pub age: u8,
    /// Gender wire value.
    pub gender: Gender,
    /// Marital status wire value.
    #[serde(rename = "maritalStatus")]
    pub marital_status: MaritalStatus,
    /// Opinion on the topic.
    pub opinion: String,
    /// Religious perspective.
    pub religious_view: String,
    /// Cultural factors that apply.
    pub cultural_factors: String,
    /// Challenges faced.
    pub challenges: String,
    /// Perceived benefits.
    pub benefits: String,
    /// Sources of guidance.
    pub guidance: String,
    /// Observed societal changes.
    pub societal_changes: String,
}

/// A submission whose every field has passed validation.
///
/// Only the validator constructs one. It is never persisted whole; call
/// [`split`](Self::split) to separate the name from the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub(crate) name: DeclaredName,
    pub(crate) record: AnonymizedRecord,
}

impl ValidatedSubmission {
    /// The declared name.
    #[must_use]
    pub fn name(&self) -> &DeclaredName {
        &self.name
    }

    /// The non-identifying fields.
    #[must_use]
    pub fn record(&self) -> &AnonymizedRecord {
        &self.record
    }

    /// Separate the identifying name from the anonymizable payload.
    #[must_use]
    pub fn split(self) -> (AnonymizedRecord, DeclaredName) {
        (self.record, self.name)
    }
}
