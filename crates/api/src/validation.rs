use crate::error::ApiError;
use validator::{Validate, ValidationErrors};

pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value
        .validate()
        .map_err(|errors| ApiError::Validation(describe(&errors)))
}

/// `field: code` pairs, sorted by field so messages are stable.
fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let codes: Vec<&str> = errors.iter().map(|error| error.code.as_ref()).collect();
            format!("{field}: {}", codes.join(", "))
        })
        .collect();
    fields.sort();
    fields.join("; ")
}
