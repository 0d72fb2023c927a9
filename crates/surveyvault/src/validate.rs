//! Input validation for questionnaire submissions.
//!
//! The validator never fails: malformed input is reported as an ordered list
//! of [`Violation`]s, one per offending field, so a participant can correct
//! every problem in a single round trip.

use serde::Serialize;
use tracing::trace;

use crate::submission::{
    AnonymizedRecord, DeclaredName, Gender, MaritalStatus, RawSubmission, ValidatedSubmission,
};

/// Inclusive bounds for the `age` field.
pub const AGE_RANGE: std::ops::RangeInclusive<i64> = 0..=120;

/// A single field-level constraint violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Wire name of the offending field.
    pub field: &'static str,
    /// Human-readable description of the problem.
    pub message: String,
}

impl Violation {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Maximum length of a free-text field in characters, after trimming.
    /// Zero disables the check.
    pub max_text_length: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_text_length: 10_000,
        }
    }
}

/// Checks and normalizes raw submissions.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    /// Create a validator with the given configuration.
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a raw submission.
    ///
    /// # Errors
    ///
    /// Returns every violation found, in form field order. The list is never
    /// empty when this returns `Err`.
    pub fn validate(
        &self,
        raw: &RawSubmission,
    ) -> std::result::Result<ValidatedSubmission, Vec<Violation>> {
        let mut violations = Vec::new();

        let name = self.text("name", raw.name.as_deref(), &mut violations);
        let age = collect(check_age(raw.age.as_deref()), &mut violations);
        let gender = collect(
            check_choice(
                "gender",
                raw.gender.as_deref(),
                Gender::from_wire,
                &Gender::ALL.map(|g| g.as_str()),
            ),
            &mut violations,
        );
        let marital_status = collect(
            check_choice(
                "maritalStatus",
                raw.marital_status.as_deref(),
                MaritalStatus::from_wire,
                &MaritalStatus::ALL.map(|m| m.as_str()),
            ),
            &mut violations,
        );
        let opinion = self.text("opinion", raw.opinion.as_deref(), &mut violations);
        let religious_view =
            self.text("religious_view", raw.religious_view.as_deref(), &mut violations);
        let cultural_factors =
            self.text("cultural_factors", raw.cultural_factors.as_deref(), &mut violations);
        let challenges = self.text("challenges", raw.challenges.as_deref(), &mut violations);
        let benefits = self.text("benefits", raw.benefits.as_deref(), &mut violations);
        let guidance = self.text("guidance", raw.guidance.as_deref(), &mut violations);
        let societal_changes =
            self.text("societal_changes", raw.societal_changes.as_deref(), &mut violations);

        match (
            name,
            age,
            gender,
            marital_status,
            opinion,
            religious_view,
            cultural_factors,
            challenges,
            benefits,
            guidance,
            societal_changes,
        ) {
            (
                Some(name),
                Some(age),
                Some(gender),
                Some(marital_status),
                Some(opinion),
                Some(religious_view),
                Some(cultural_factors),
                Some(challenges),
                Some(benefits),
                Some(guidance),
                Some(societal_changes),
            ) if violations.is_empty() => Ok(ValidatedSubmission {
                name: DeclaredName::new(name),
                record: AnonymizedRecord {
                    age,
                    gender,
                    marital_status,
                    opinion,
                    religious_view,
                    cultural_factors,
                    challenges,
                    benefits,
                    guidance,
                    societal_changes,
                },
            }),
            _ => {
                trace!(count = violations.len(), "Submission rejected by validator");
                Err(violations)
            }
        }
    }

    fn text(
        &self,
        field: &'static str,
        value: Option<&str>,
        violations: &mut Vec<Violation>,
    ) -> Option<String> {
        collect(self.check_text(field, value), violations)
    }

    fn check_text(
        &self,
        field: &'static str,
        value: Option<&str>,
    ) -> std::result::Result<String, Violation> {
        let trimmed = value.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            return Err(Violation::new(field, format!("{field} is required")));
        }

        let max = self.config.max_text_length;
        if max > 0 && trimmed.chars().count() > max {
            return Err(Violation::new(
                field,
                format!("{field} must be at most {max} characters"),
            ));
        }

        Ok(escape_html(trimmed))
    }
}

fn collect<T>(
    result: std::result::Result<T, Violation>,
    violations: &mut Vec<Violation>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(violation) => {
            violations.push(violation);
            None
        }
    }
}

fn check_age(value: Option<&str>) -> std::result::Result<u8, Violation> {
    let trimmed = value.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(Violation::new("age", "age is required"));
    }

    let digits = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Violation::new("age", "age must be an integer"));
    }

    let out_of_range = || {
        Violation::new(
            "age",
            format!(
                "age must be between {} and {}",
                AGE_RANGE.start(),
                AGE_RANGE.end()
            ),
        )
    };

    // Digit-only strings fail to parse only on overflow.
    let age: i64 = trimmed.parse().map_err(|_| out_of_range())?;
    if !AGE_RANGE.contains(&age) {
        return Err(out_of_range());
    }
    u8::try_from(age).map_err(|_| out_of_range())
}

fn check_choice<T>(
    field: &'static str,
    value: Option<&str>,
    parse: fn(&str) -> Option<T>,
    allowed: &[&str],
) -> std::result::Result<T, Violation> {
    let trimmed = value.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(Violation::new(field, format!("{field} is required")));
    }
    parse(trimmed).ok_or_else(|| {
        Violation::new(
            field,
            format!("{field} must be one of: {}", allowed.join(", ")),
        )
    })
}

/// Escape characters that are meaningful to HTML renderers.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '\\' => out.push_str("&#x5C;"),
            '`' => out.push_str("&#96;"),
            _ => out.push(c),
        }
    }
    out
}
