//! ESI HTTP client implementation.

use super::{
    ContractEntry, DataSourceError, IdentitySource, ItemEntry, JournalEntry, LedgerSource,
    NameRef, Page, PriceSheet, TokenGrant, TokenSource,
};
use crate::domain::{CharacterId, Decimal, TypeId};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Remote ledger and identity client backed by the public ESI API.
#[derive(Debug, Clone)]
pub struct EsiSource {
    client: Client,
    base_url: String,
}

impl EsiSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Create with the default ESI base URL.
    pub fn default_url() -> Self {
        Self::new("https://esi.evetech.net/latest".to_string())
    }

    async fn get_raw(
        &self,
        path: &str,
        token: Option<&str>,
        page: Option<i32>,
    ) -> Result<reqwest::Response, DataSourceError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let mut request = self.client.get(&url);
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(page) = page {
                request = request.query(&[("page", page)]);
            }

            let response = request.send().await.map_err(|e| {
                backoff::Error::transient(DataSourceError::Network(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::Http {
                    status: status.as_u16(),
                    message: "server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::Http {
                    status: status.as_u16(),
                    message: "client error".to_string(),
                }));
            }

            Ok(response)
        })
        .await
    }

    /// Fetch one page of a paginated endpoint, reading the total page
    /// count from the `X-Pages` response header (absent means 1).
    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        page: i32,
    ) -> Result<Page<T>, DataSourceError> {
        debug!(path, page, "fetching ledger page");
        let response = self.get_raw(path, Some(token), Some(page)).await?;

        let pages = response
            .headers()
            .get("X-Pages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(1);

        let entries = response
            .json::<Vec<T>>()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;

        Ok(Page { entries, pages })
    }
}

#[derive(Debug, Deserialize)]
struct MarketPrice {
    type_id: i64,
    #[serde(default)]
    adjusted_price: Decimal,
}

#[async_trait]
impl LedgerSource for EsiSource {
    async fn journal_page(
        &self,
        character: CharacterId,
        token: &str,
        page: i32,
    ) -> Result<Page<JournalEntry>, DataSourceError> {
        self.get_page(
            &format!("/characters/{}/wallet/journal/", character),
            token,
            page,
        )
        .await
    }

    async fn contracts_page(
        &self,
        character: CharacterId,
        token: &str,
        page: i32,
    ) -> Result<Page<ContractEntry>, DataSourceError> {
        self.get_page(&format!("/characters/{}/contracts/", character), token, page)
            .await
    }

    async fn contract_items(
        &self,
        assignee: CharacterId,
        contract_id: i64,
        token: &str,
    ) -> Result<Vec<ItemEntry>, DataSourceError> {
        let page = self
            .get_page::<ItemEntry>(
                &format!("/characters/{}/contracts/{}/items/", assignee, contract_id),
                token,
                1,
            )
            .await?;
        Ok(page.entries)
    }

    async fn market_prices(&self) -> Result<PriceSheet, DataSourceError> {
        let response = self.get_raw("/markets/prices/", None, None).await?;

        // The Expires header declares when the remote's own cache rolls
        // over; refresh one second after that.
        let expires = response
            .headers()
            .get("Expires")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(|t| t.with_timezone(&Utc) + ChronoDuration::seconds(1))
            .unwrap_or_else(|| Utc::now() + ChronoDuration::minutes(5));

        let raw = response
            .json::<Vec<MarketPrice>>()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;

        let prices = raw
            .into_iter()
            .map(|p| (TypeId::new(p.type_id), p.adjusted_price))
            .collect();

        Ok(PriceSheet { prices, expires })
    }
}

#[async_trait]
impl IdentitySource for EsiSource {
    async fn resolve_names(&self, ids: &[i64]) -> Result<Vec<NameRef>, DataSourceError> {
        let url = format!("{}/universe/names/", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ids)
            .send()
            .await
            .map_err(|e| DataSourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataSourceError::Http {
                status: status.as_u16(),
                message: "name resolution failed".to_string(),
            });
        }

        response
            .json::<Vec<NameRef>>()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))
    }

    async fn corporation_alliance(
        &self,
        corporation: i64,
    ) -> Result<Option<i64>, DataSourceError> {
        #[derive(Deserialize)]
        struct Corporation {
            alliance_id: Option<i64>,
        }

        let response = self
            .get_raw(&format!("/corporations/{}/", corporation), None, None)
            .await?;
        let corp = response
            .json::<Corporation>()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;
        Ok(corp.alliance_id)
    }

    async fn character_corporation(
        &self,
        character: CharacterId,
    ) -> Result<i64, DataSourceError> {
        #[derive(Deserialize)]
        struct Character {
            corporation_id: i64,
        }

        let response = self
            .get_raw(&format!("/characters/{}/", character), None, None)
            .await?;
        let character = response
            .json::<Character>()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;
        Ok(character.corporation_id)
    }
}

/// SSO-backed token refresh. The OAuth exchange itself is a thin
/// pass-through; the engine only consumes the resulting grant.
#[derive(Debug, Clone)]
pub struct SsoTokenSource {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl SsoTokenSource {
    pub fn new(base_url: String, client_id: String, client_secret: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenSource for SsoTokenSource {
    async fn refresh(
        &self,
        _character: CharacterId,
        refresh_token: &str,
    ) -> Result<TokenGrant, DataSourceError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            refresh_token: String,
            expires_in: i64,
        }

        #[derive(Deserialize)]
        struct VerifyResponse {
            #[serde(rename = "CharacterID")]
            character_id: i64,
            #[serde(rename = "CharacterOwnerHash")]
            owner_hash: String,
        }

        let response = self
            .client
            .post(format!("{}/v2/oauth/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| DataSourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataSourceError::Http {
                status: status.as_u16(),
                message: "token refresh failed".to_string(),
            });
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;

        let verify = self
            .client
            .get(format!("{}/oauth/verify", self.base_url))
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| DataSourceError::Network(e.to_string()))?
            .json::<VerifyResponse>()
            .await
            .map_err(|e| DataSourceError::Parse(e.to_string()))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires: Utc::now() + ChronoDuration::seconds(token.expires_in),
            character_id: CharacterId::new(verify.character_id),
            owner_hash: verify.owner_hash,
        })
    }
}
