//! ZeroBounce `/v2/validate` client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use super::{EmailValidator, Validation, ValidationError};

const DEFAULT_BASE_URL: &str = "https://api.zerobounce.net";

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    did_you_mean: Option<String>,
}

impl From<ValidateResponse> for Validation {
    fn from(resp: ValidateResponse) -> Self {
        Validation {
            valid: resp.status.eq_ignore_ascii_case("valid"),
            suggestion: resp
                .did_you_mean
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Clone)]
pub struct ZeroBounceValidator {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ZeroBounceValidator {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ValidationError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ValidationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidationError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

impl std::fmt::Debug for ZeroBounceValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZeroBounceValidator")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl EmailValidator for ZeroBounceValidator {
    async fn validate(&self, address: &str) -> Result<Validation, ValidationError> {
        let response = self
            .client
            .get(format!("{}/v2/validate", self.base_url))
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("email", address),
                ("ip_address", ""),
            ])
            .send()
            .await
            .map_err(|e| ValidationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ValidationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: ValidateResponse = response
            .json()
            .await
            .map_err(|e| ValidationError::Decode(e.to_string()))?;
        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Validation {
        serde_json::from_str::<ValidateResponse>(json).unwrap().into()
    }

    #[test]
    fn valid_status_is_case_insensitive() {
        assert_eq!(parse(r#"{"status":"Valid"}"#), Validation::valid());
        assert_eq!(parse(r#"{"status":"invalid"}"#), Validation::invalid());
    }

    #[test]
    fn suggestion_comes_from_did_you_mean() {
        let v = parse(r#"{"status":"invalid","did_you_mean":"jane@gmail.com"}"#);
        assert_eq!(v, Validation::typo("jane@gmail.com"));

        let blank = parse(r#"{"status":"invalid","did_you_mean":""}"#);
        assert_eq!(blank.suggestion, None);
    }

    #[test]
    fn missing_fields_mean_invalid() {
        assert_eq!(parse("{}"), Validation::invalid());
    }
}
