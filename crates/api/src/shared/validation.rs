//! Common Validators
//!
//! Reusable validation for request data. Violations accumulate and collapse
//! into a single `Validation` error whose message names every offending
//! field.

use crate::error::{AppError, AppResult};

/// Validator builder for fluent validation
#[derive(Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    /// Create a new validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a string is not empty
    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            self.errors.push(format!("{} is required", field));
        }
        self
    }

    /// Check if an optional value is present
    pub fn required_option<T>(mut self, field: &str, value: &Option<T>) -> Self {
        if value.is_none() {
            self.errors.push(format!("{} is required", field));
        }
        self
    }

    /// Check minimum value
    pub fn min<T: PartialOrd + std::fmt::Display>(mut self, field: &str, value: T, min: T) -> Self {
        if value < min {
            self.errors
                .push(format!("{} must be at least {}", field, min));
        }
        self
    }

    /// Check value is within range (inclusive)
    pub fn range<T: PartialOrd + std::fmt::Display>(
        mut self,
        field: &str,
        value: T,
        min: T,
        max: T,
    ) -> Self {
        if value < min || value > max {
            self.errors
                .push(format!("{} must be between {} and {}", field, min, max));
        }
        self
    }

    /// Add custom validation
    pub fn check(mut self, ok: bool, message: impl Into<String>) -> Self {
        if !ok {
            self.errors.push(message.into());
        }
        self
    }

    /// Finish validation and return result
    pub fn finish(self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(self.errors.join("; ")))
        }
    }
}
