//! Card creation request and its local validation.
//!
//! Theme text is checked before any payment prompt is shown so that
//! invalid input never costs the user a signing interaction.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Minimum theme length, in characters, after trimming.
pub const MIN_THEME_CHARS: usize = 3;
/// Maximum theme length, in characters, after trimming.
pub const MAX_THEME_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Visibility
// ---------------------------------------------------------------------------

/// Whether the finished card is listed publicly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        matches!(self, Self::Public)
    }
}

// ---------------------------------------------------------------------------
// CreationRequest
// ---------------------------------------------------------------------------

/// User input for a new card.
///
/// Fields are private so a request cannot be altered once it has been
/// handed to the payment step.
#[derive(Debug, Clone, PartialEq)]
pub struct CreationRequest {
    theme_text: String,
    visibility: Visibility,
    target_resource: String,
    quoted_price_usd: Option<f64>,
}

impl CreationRequest {
    pub fn new(
        theme_text: impl Into<String>,
        visibility: Visibility,
        target_resource: impl Into<String>,
        quoted_price_usd: Option<f64>,
    ) -> Self {
        Self {
            theme_text: theme_text.into(),
            visibility,
            target_resource: target_resource.into(),
            quoted_price_usd,
        }
    }

    /// Raw theme text as entered.
    pub fn theme_text(&self) -> &str {
        &self.theme_text
    }

    /// Theme text with surrounding whitespace removed; this is what is
    /// validated and sent.
    pub fn trimmed_theme(&self) -> &str {
        self.theme_text.trim()
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn target_resource(&self) -> &str {
        &self.target_resource
    }

    /// The caller's quoted price, if it is a usable positive number.
    pub fn known_price_usd(&self) -> Option<f64> {
        self.quoted_price_usd.filter(|p| p.is_finite() && *p > 0.0)
    }

    /// Run every local check on the request.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_theme_text(&self.theme_text)?;
        if self.target_resource.trim().is_empty() {
            return Err(CoreError::Validation(
                "target resource must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check that `text`, once trimmed, is between [`MIN_THEME_CHARS`] and
/// [`MAX_THEME_CHARS`] characters (Unicode scalar values) long.
pub fn validate_theme_text(text: &str) -> Result<(), CoreError> {
    let len = text.trim().chars().count();
    if len < MIN_THEME_CHARS {
        return Err(CoreError::Validation(format!(
            "theme must be at least {MIN_THEME_CHARS} characters, got {len}"
        )));
    }
    if len > MAX_THEME_CHARS {
        return Err(CoreError::Validation(format!(
            "theme must be at most {MAX_THEME_CHARS} characters, got {len}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
