use serde::{Deserialize, Serialize};

/// Form body of the client-credential grant.
#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub account_id: &'a str,
}

/// Response from `/v2/token`. Fields are optional so a partial response
/// surfaces as `AuthError::MissingField` rather than a parse error.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}
