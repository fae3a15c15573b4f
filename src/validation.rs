use serde::Deserialize;
use validator::Validate;

use crate::error::GateError;

/// Body of `POST /api/shorten`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShortenRequest {
    #[validate(url)]
    pub original: String,
}

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Accepts absolute `http`/`https` URLs with a host, no longer than `max_length` bytes.
    pub fn validate_shorten_request(
        request: &ShortenRequest,
        max_length: usize,
    ) -> Result<(), GateError> {
        if request.original.len() > max_length {
            return Err(GateError::InvalidRequest(format!(
                "Provided url exceeds max-length of {}",
                max_length
            )));
        }

        request
            .validate()
            .map_err(|_| GateError::InvalidRequest("Invalid url provided".to_string()))?;

        let scheme = request
            .original
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase());
        match scheme.as_deref() {
            Some("http") | Some("https") => Ok(()),
            _ => Err(GateError::InvalidRequest(
                "Invalid protocol provided. Only http:// or https:// allowed".to_string(),
            )),
        }
    }
}
