use thiserror::Error;

/// Failures of the client-credential token exchange.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token request for environment '{env}' failed: {source}")]
    Request {
        env: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Token request for environment '{env}' rejected (HTTP {status}): {message}")]
    Rejected {
        env: String,
        status: u16,
        message: String,
    },

    #[error("Token response for environment '{env}' is missing '{field}'")]
    MissingField { env: String, field: &'static str },

    #[error("Token response for environment '{env}' has an unusable expires_in of {expires_in}")]
    InvalidExpiry { env: String, expires_in: i64 },

    #[error("Token response for environment '{env}' is not valid JSON: {source}")]
    Json {
        env: String,
        #[source]
        source: serde_json::Error,
    },
}
