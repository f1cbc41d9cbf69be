use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::retry::{RetryConfig, RetryExecutor, RetryMetrics};
use harvest_core::{
    ConfigError, CoreError, ErrorExt, FetchError, FetchOutcome, HarvestConfig, PostFetcher,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const CHALLENGE_DETAIL_PATH: &str = "/api/challenge/detail/";
const CHALLENGE_ITEMS_PATH: &str = "/api/challenge/item_list/";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeDetailResponse {
    #[serde(default)]
    status_code: i64,
    challenge_info: Option<ChallengeInfo>,
}

#[derive(Debug, Deserialize)]
struct ChallengeInfo {
    challenge: Option<Challenge>,
}

#[derive(Debug, Deserialize)]
struct Challenge {
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemListResponse {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    item_list: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    cursor: Value,
}

/// One page of the hashtag feed. Items are left raw; validation happens
/// during reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPage {
    pub items: Vec<Value>,
    pub has_more: bool,
    pub cursor: u64,
}

/// Map a non-success HTTP status to the fetch error it stands for.
pub fn status_error(status: StatusCode, retry_after: Option<&str>, hashtag: &str) -> FetchError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimitExceeded {
            retry_after: retry_after
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Forbidden {
            resource: format!("#{}", hashtag),
        },
        StatusCode::NOT_FOUND => FetchError::HashtagNotFound {
            hashtag: hashtag.to_string(),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FetchError::RequestTimeout,
        other => FetchError::ServerError {
            status_code: other.as_u16(),
        },
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &str, what: &str) -> Result<T, FetchError> {
    // An empty 200 is how the web endpoints answer a missing or stale token.
    if body.trim().is_empty() {
        return Err(FetchError::InvalidResponse {
            details: format!("empty {} response", what),
        });
    }
    serde_json::from_str(body).map_err(|e| FetchError::InvalidResponse {
        details: format!("malformed {} response: {}", what, e),
    })
}

/// Extract the challenge id the item feed is keyed by.
pub fn parse_challenge_id(body: &str, hashtag: &str) -> Result<String, FetchError> {
    let response: ChallengeDetailResponse = parse_body(body, "challenge detail")?;
    let id = response
        .challenge_info
        .and_then(|info| info.challenge)
        .and_then(|challenge| match challenge.id {
            Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        });

    match id {
        Some(id) => Ok(id),
        None => {
            debug!(
                "Challenge lookup for #{} answered status {} without an id",
                hashtag, response.status_code
            );
            Err(FetchError::HashtagNotFound {
                hashtag: hashtag.to_string(),
            })
        }
    }
}

pub fn parse_item_page(body: &str) -> Result<ItemPage, FetchError> {
    let response: ItemListResponse = parse_body(body, "item list")?;
    if response.status_code != 0 {
        return Err(FetchError::InvalidResponse {
            details: format!("item list status {}", response.status_code),
        });
    }

    let cursor = match &response.cursor {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    Ok(ItemPage {
        items: response.item_list,
        has_more: response.has_more,
        cursor,
    })
}

/// The fetch error to report as a transient outcome, if `error` is one that
/// a later run could get past.
fn as_transient(error: &CoreError) -> Option<FetchError> {
    match error {
        CoreError::Fetch(FetchError::CircuitOpen) => Some(FetchError::CircuitOpen),
        _ if !error.is_retryable() => None,
        CoreError::Fetch(fetch_error) => Some(fetch_error.clone()),
        CoreError::Network(e) if e.is_timeout() => Some(FetchError::RequestTimeout),
        CoreError::Timeout { .. } => Some(FetchError::RequestTimeout),
        other => Some(FetchError::InvalidResponse {
            details: other.to_string(),
        }),
    }
}

/// Client for the public hashtag search of the web app.
#[derive(Debug)]
pub struct TikTokClient {
    http_client: Client,
    base_url: Url,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
    ms_token: Option<String>,
    page_size: usize,
}

impl TikTokClient {
    pub fn new(config: &HarvestConfig) -> Result<Self, CoreError> {
        let fetch = &config.fetch;
        let base_url = Url::parse(&fetch.base_url).map_err(|e| ConfigError::InvalidValue {
            field: "fetch.base_url".to_string(),
            value: format!("{} ({})", fetch.base_url, e),
        })?;

        let http_client = Client::builder()
            .user_agent(&fetch.user_agent)
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::per_minute(
                fetch.requests_per_minute,
            ))),
            retry: RetryExecutor::new(RetryConfig::from(&config.retry)),
            ms_token: fetch.ms_token.clone(),
            page_size: fetch.page_size.max(1),
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, CoreError> {
        let mut url = self.base_url.join(path).map_err(|e| CoreError::Internal {
            message: format!("cannot build URL for {}: {}", path, e),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.extend_pairs(params);
            query.append_pair("aid", "1988");
            if let Some(token) = &self.ms_token {
                query.append_pair("msToken", token);
            }
        }
        Ok(url)
    }

    async fn get_text(&self, url: Url, hashtag: &str) -> Result<String, CoreError> {
        let waited = self.rate_limiter.acquire_permit().await;
        if waited > Duration::from_millis(100) {
            debug!("Waited {:?} for a request slot", waited);
        }

        debug!("GET {}", url.path());
        let response = self.http_client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::Fetch(FetchError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let error = status_error(status, retry_after.as_deref(), hashtag);
            warn!("Request for #{} failed with status {}: {}", hashtag, status, error);
            return Err(error.into());
        }

        Ok(response.text().await?)
    }

    /// Resolve a hashtag name to the challenge id the item feed is keyed by.
    pub async fn challenge_id(&self, hashtag: &str) -> Result<String, CoreError> {
        let operation = format!("challenge detail #{}", hashtag);
        self.retry
            .execute(&operation, || async move {
                let url = self.endpoint(CHALLENGE_DETAIL_PATH, &[("challengeName", hashtag)])?;
                let body = self.get_text(url, hashtag).await?;
                Ok(parse_challenge_id(&body, hashtag)?)
            })
            .await
    }

    pub async fn item_page(
        &self,
        hashtag: &str,
        challenge_id: &str,
        cursor: u64,
        count: usize,
    ) -> Result<ItemPage, CoreError> {
        let operation = format!("item list #{} at {}", hashtag, cursor);
        let (cursor, count) = (cursor.to_string(), count.to_string());
        let (cursor, count) = (cursor.as_str(), count.as_str());
        self.retry
            .execute(&operation, || async move {
                let url = self.endpoint(
                    CHALLENGE_ITEMS_PATH,
                    &[("challengeID", challenge_id), ("count", count), ("cursor", cursor)],
                )?;
                let body = self.get_text(url, hashtag).await?;
                Ok(parse_item_page(&body)?)
            })
            .await
    }

    /// Page through the hashtag feed until `limit` items are collected or the
    /// feed runs dry. Once at least one page arrived, a failing later page
    /// ends the search with what was gathered so far.
    pub async fn search(&self, hashtag: &str, limit: usize) -> Result<Vec<Value>, CoreError> {
        let mut items = Vec::new();
        if limit == 0 {
            return Ok(items);
        }

        let challenge_id = self.challenge_id(hashtag).await?;
        debug!("#{} resolved to challenge {}", hashtag, challenge_id);

        let mut cursor = 0u64;
        while items.len() < limit {
            let count = self.page_size.min(limit - items.len());
            let page = match self.item_page(hashtag, &challenge_id, cursor, count).await {
                Ok(page) => page,
                Err(e) if !items.is_empty() => {
                    warn!(
                        "Stopping #{} after {} posts, next page failed: {}",
                        hashtag,
                        items.len(),
                        e
                    );
                    break;
                }
                Err(e) => return Err(e),
            };

            if page.items.is_empty() {
                debug!("#{} returned an empty page at cursor {}", hashtag, cursor);
                break;
            }
            items.extend(page.items);

            if !page.has_more {
                break;
            }
            if page.cursor <= cursor {
                debug!("#{} cursor did not advance past {}", hashtag, cursor);
                break;
            }
            cursor = page.cursor;
        }

        items.truncate(limit);
        Ok(items)
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.retry.get_metrics()
    }
}

impl PostFetcher for TikTokClient {
    async fn fetch(&self, hashtag: &str, limit: usize) -> Result<FetchOutcome, CoreError> {
        match self.search(hashtag, limit).await {
            Ok(items) if items.is_empty() => Ok(FetchOutcome::Empty),
            Ok(items) => {
                info!("Fetched {} posts for #{}", items.len(), hashtag);
                Ok(FetchOutcome::Fetched(items))
            }
            Err(CoreError::Fetch(FetchError::HashtagNotFound { .. })) => {
                warn!("No challenge found for #{}", hashtag);
                Ok(FetchOutcome::Empty)
            }
            Err(e) => {
                let metrics = self.retry_metrics();
                debug!(
                    "Search for #{} gave up with circuit {:?}: {} retries, {} failed operations",
                    hashtag,
                    self.retry.get_circuit_breaker_state(),
                    metrics.total_retries,
                    metrics.failed_operations
                );
                match as_transient(&e) {
                    Some(transient) => Ok(FetchOutcome::Transient(transient)),
                    None => Err(e),
                }
            }
        }
    }
}
