//! Atlas Admin API client using OAuth client credentials.

use crate::atlas::access_list::{AccessListApi, AccessListEntry};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_ATLAS_BASE_URL: &str = "https://cloud.mongodb.com";
const ATLAS_ACCEPT: &str = "application/vnd.atlas.2023-01-01+json";
/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AtlasCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpInfo {
    current_ipv4_address: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct AtlasClient {
    http: reqwest::Client,
    base_url: String,
    credentials: AtlasCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl AtlasClient {
    pub fn new(base_url: impl Into<String>, credentials: AtlasCredentials) -> DbResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mongo-mcp-server/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DbError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> DbResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting Atlas access token");
        let response = self
            .http
            .post(format!("{}/api/oauth/token", self.base_url))
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| DbError::api(0, format!("Token request failed: {e}")))?;
        let response = check_status(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DbError::api(0, format!("Invalid token response: {e}")))?;

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }
}

async fn check_status(response: reqwest::Response) -> DbResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DbError::api(status.as_u16(), body))
}

#[async_trait]
impl AccessListApi for AtlasClient {
    async fn create_entries(&self, project_id: &str, entries: &[AccessListEntry]) -> DbResult<()> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/api/atlas/v2/groups/{project_id}/accessList",
                self.base_url
            ))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, ATLAS_ACCEPT)
            .header(reqwest::header::CONTENT_TYPE, ATLAS_ACCEPT)
            .json(entries)
            .send()
            .await
            .map_err(|e| DbError::api(0, format!("Access list request failed: {e}")))?;
        check_status(response).await?;
        info!(project_id = %project_id, count = entries.len(), "Access list entries created");
        Ok(())
    }

    async fn current_ip(&self) -> DbResult<String> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/api/private/ipinfo", self.base_url))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, ATLAS_ACCEPT)
            .send()
            .await
            .map_err(|e| DbError::api(0, format!("IP lookup failed: {e}")))?;
        let info: IpInfo = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| DbError::api(0, format!("Invalid IP lookup response: {e}")))?;
        Ok(info.current_ipv4_address)
    }
}

impl std::fmt::Debug for AtlasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.credentials.client_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = AtlasClient::new(
            "https://cloud.example.com/",
            AtlasCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
        )
        .unwrap();
        assert_eq!(client.base_url, "https://cloud.example.com");
        assert!(!format!("{client:?}").contains("secret"));
    }
}
