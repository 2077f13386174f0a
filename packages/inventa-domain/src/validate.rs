use std::collections::HashSet;

use crate::disclosure::NewDisclosure;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
	pub field: String,
	pub message: String,
}
impl ValidationError {
	fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
		Self { field: field.into(), message: message.into() }
	}
}

/// Checks required fields of the create path before any transaction is opened.
pub fn validate_new_disclosure(input: &NewDisclosure) -> Result<(), ValidationError> {
	if input.title.trim().is_empty() {
		return Err(ValidationError::new("title", "must be non-empty"));
	}
	if input.description.trim().is_empty() {
		return Err(ValidationError::new("description", "must be non-empty"));
	}
	if input.key_differences.is_empty() {
		return Err(ValidationError::new("keyDifferences", "at least one is required"));
	}
	if input.inventors.is_empty() {
		return Err(ValidationError::new("inventors", "at least one is required"));
	}

	let mut ordinals = HashSet::new();

	for (idx, key_difference) in input.key_differences.iter().enumerate() {
		let field = format!("keyDifferences[{idx}]");

		if key_difference.ordinal == 0 {
			return Err(ValidationError::new(
				format!("{field}.ordinal"),
				"must be 1 or greater",
			));
		}
		if !ordinals.insert(key_difference.ordinal) {
			return Err(ValidationError::new(format!("{field}.ordinal"), "must be unique"));
		}
		if !key_difference.confidence.is_finite()
			|| !(0.0..=1.0).contains(&key_difference.confidence)
		{
			return Err(ValidationError::new(
				format!("{field}.confidence"),
				"must be in the range 0.0-1.0",
			));
		}
	}

	for (idx, inventor) in input.inventors.iter().enumerate() {
		if inventor.name.trim().is_empty() {
			return Err(ValidationError::new(format!("inventors[{idx}].name"), "must be non-empty"));
		}
	}

	Ok(())
}
