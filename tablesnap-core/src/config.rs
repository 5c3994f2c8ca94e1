//! Configuration for the record store connection and the change report
//!
//! [`StoreConfig`] carries everything needed to reach a table store;
//! [`DiffConfig`] controls how snapshots are matched and compared.

use serde::{Deserialize, Serialize};

use crate::diff::FieldComparisonPolicy;
use crate::selector::MatchMode;

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "us-east-1";

/// Field the change report is sorted by unless configured otherwise
pub const DEFAULT_ORDERING_FIELD: &str = "number";

/// Connection settings for the remote table store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Alternative endpoint, e.g. DynamoDB Local (`http://localhost:8000`)
    pub endpoint_url: Option<String>,
    /// AWS region
    pub region: String,
    /// Explicit access key id; must be paired with `secret_access_key`
    pub access_key_id: Option<String>,
    /// Explicit secret access key; must be paired with `access_key_id`
    pub secret_access_key: Option<String>,
}

impl StoreConfig {
    /// Configuration for a store reached through a custom endpoint
    pub fn with_endpoint<S: Into<String>>(endpoint_url: S) -> Self {
        StoreConfig {
            endpoint_url: Some(endpoint_url.into()),
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.region.trim().is_empty() {
            return Err(crate::TableSnapError::validation("region must not be empty"));
        }

        if let Some(endpoint) = &self.endpoint_url {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(crate::TableSnapError::validation(format!(
                    "endpoint url must start with http:// or https://, got '{endpoint}'"
                )));
            }
        }

        match (&self.access_key_id, &self.secret_access_key) {
            (Some(_), None) | (None, Some(_)) => Err(crate::TableSnapError::validation(
                "access key id and secret access key must be given together",
            )),
            _ => Ok(()),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            endpoint_url: None,
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// Settings for selecting the previous snapshot and building the change report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Identity field; `None` asks the store for its partition key and falls back to `id`
    pub identity_key: Option<String>,
    /// Numeric field on the new record used to order the report
    pub ordering_field: String,
    /// Which fields take part in the comparison
    pub field_policy: FieldComparisonPolicy,
    /// How snapshot files are matched against the base name
    pub match_mode: MatchMode,
}

impl DiffConfig {
    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if matches!(&self.identity_key, Some(key) if key.is_empty()) {
            return Err(crate::TableSnapError::validation(
                "identity key must not be empty",
            ));
        }
        if self.ordering_field.is_empty() {
            return Err(crate::TableSnapError::validation(
                "ordering field must not be empty",
            ));
        }
        Ok(())
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        DiffConfig {
            identity_key: None,
            ordering_field: DEFAULT_ORDERING_FIELD.to_string(),
            field_policy: FieldComparisonPolicy::default(),
            match_mode: MatchMode::default(),
        }
    }
}
