//! Three-state field for partial updates.

use serde::{Deserialize, Deserializer};

use crate::AppError;

/// `Absent` when the field is missing from the body, `Clear` for an explicit
/// `null`, `Set` for a value. Fields must carry `#[serde(default)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Absent,
    Clear,
    Set(T),
}

// manual impl: derive would demand `T: Default`
impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// Apply to a field that cannot be cleared.
    pub fn apply_required(self, field: &str, target: &mut T) -> Result<(), AppError> {
        match self {
            Patch::Absent => Ok(()),
            Patch::Clear => Err(AppError::bad_request(format!("{} cannot be null", field))),
            Patch::Set(value) => {
                *target = value;
                Ok(())
            }
        }
    }

    pub fn apply_optional(self, target: &mut Option<T>) {
        match self {
            Patch::Absent => {}
            Patch::Clear => *target = None,
            Patch::Set(value) => *target = Some(value),
        }
    }
}

impl Patch<String> {
    /// Like [`Patch::apply_required`], also rejecting blank strings. Stores the
    /// trimmed value.
    pub fn apply_text(self, field: &str, target: &mut String) -> Result<(), AppError> {
        match self {
            Patch::Set(value) => {
                *target = required_text(field, &value)?;
                Ok(())
            }
            other => other.apply_required(field, target),
        }
    }
}

/// Trimmed `value`, or a 400 naming `field` when blank.
pub fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}
