use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced by the OpenWeather client.
///
/// Only [`WeatherError::LocationNotFound`] is meant to be handled by asking
/// the user for different input; the other variants pass through unchanged.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// The payload did not fit the record it was decoded into.
    #[error("response does not match `{shape}`: {detail}")]
    SchemaMismatch { shape: &'static str, detail: String },

    /// A geocoding query matched nothing.
    #[error("no location found for '{query}'")]
    LocationNotFound { query: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} responded with status {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },
}

impl WeatherError {
    pub(crate) fn schema(shape: &'static str, detail: impl ToString) -> Self {
        WeatherError::SchemaMismatch {
            shape,
            detail: detail.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WeatherError::LocationNotFound { .. })
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
