//! Read-only view of the door and window sensors known to Home Assistant.
//!
//! Lets the keypad show which sensors are open before the user tries to arm. Each
//! configured entity is fetched from `GET {base_url}/api/states/{entity_id}`; entities
//! that fail to load are logged and left out of the listing.

use futures_util::future::join_all;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HomeAssistantConfig;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Invalid Home Assistant token: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Home Assistant request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Home Assistant returned {status} for {entity_id}")]
    Status {
        entity_id: String,
        status: reqwest::StatusCode,
    },
}

/// One sensor as shown on the keypad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorStatus {
    pub entity_id: String,
    pub state: String,
    pub open: bool,
    pub friendly_name: Option<String>,
    pub device_class: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    state: String,
    #[serde(default)]
    attributes: EntityAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct EntityAttributes {
    friendly_name: Option<String>,
    device_class: Option<String>,
}

impl From<EntityState> for SensorStatus {
    fn from(entity: EntityState) -> Self {
        Self {
            open: is_open_state(&entity.state),
            entity_id: entity.entity_id,
            state: entity.state,
            friendly_name: entity.attributes.friendly_name,
            device_class: entity.attributes.device_class,
        }
    }
}

/// Binary sensors report `on`, cover-like entities report `open`.
pub fn is_open_state(state: &str) -> bool {
    matches!(state.trim().to_ascii_lowercase().as_str(), "on" | "open")
}

pub struct SensorProxy {
    http: reqwest::Client,
    base_url: String,
    sensors: Vec<String>,
}

impl SensorProxy {
    pub fn new(config: &HomeAssistantConfig) -> Result<Self, SensorError> {
        let mut headers = HeaderMap::new();
        if !config.token.is_empty() {
            let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            sensors: config.sensors.clone(),
        })
    }

    pub fn configured(&self) -> &[String] {
        &self.sensors
    }

    /// Fetches every configured sensor, skipping those that cannot be loaded.
    pub async fn list(&self, open_only: bool) -> Vec<SensorStatus> {
        let results = join_all(self.sensors.iter().map(|id| self.fetch(id))).await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!("Skipping sensor: {}", e);
                    None
                }
            })
            .filter(|status| !open_only || status.open)
            .collect()
    }

    async fn fetch(&self, entity_id: &str) -> Result<SensorStatus, SensorError> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        debug!("Fetching sensor {}", url);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SensorError::Status {
                entity_id: entity_id.to_string(),
                status: response.status(),
            });
        }
        let entity: EntityState = response.json().await?;
        Ok(entity.into())
    }
}
