/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/x_api.rs
 * Responsibility: X API v2 adapter. Identity lookup, mention fetch and post creation.
 */

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::HTTP_CLIENT;
use crate::config::XConfig;
use crate::mentions::{Mention, MentionBatch, MentionSource, Publisher};
use crate::oauth::OAuthCredentials;
use crate::state::MentionId;

#[derive(Debug, Deserialize)]
struct MentionsResponse {
    #[serde(default)]
    data: Vec<TweetData>,
    #[serde(default)]
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: MentionId,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Default)]
struct Includes {
    #[serde(default)]
    users: Vec<UserData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: Option<CreatedTweet>,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct XClient {
    api_base: String,
    bearer_token: String,
    oauth: OAuthCredentials,
    timeout: Duration,
}

impl XClient {
    pub fn from_config(config: &XConfig, timeout: Duration) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            oauth: OAuthCredentials {
                consumer_key: config.api_key.clone(),
                consumer_secret: config.api_secret.clone(),
                token: config.access_token.clone(),
                token_secret: config.access_token_secret.clone(),
            },
            timeout,
        }
    }

    /// Configured id wins; otherwise ask the API who the access token belongs to.
    pub async fn resolve_self_id(&self, configured: Option<&str>) -> Result<String> {
        if let Some(id) = configured.map(str::trim).filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        self.verify_credentials().await
    }

    pub async fn verify_credentials(&self) -> Result<String> {
        let url = format!("{}/2/users/me", self.api_base);
        let auth = self.oauth.authorization_header("GET", &url, &[]);

        let response = HTTP_CLIENT
            .get(&url)
            .header("Authorization", auth)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach X identity endpoint")?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body).context("Unable to verify X credentials"));
        }

        let parsed: UserResponse = serde_json::from_str(&body).context("Failed to parse X identity response")?;
        let user = parsed.data.ok_or_else(|| anyhow!("Unable to verify X credentials: empty identity"))?;
        log::info!("🪪 Authenticated as @{} ({})", user.username, user.id);
        Ok(user.id)
    }

    async fn create_post(&self, text: &str, in_reply_to: Option<MentionId>) -> Result<String> {
        let url = format!("{}/2/tweets", self.api_base);
        let auth = self.oauth.authorization_header("POST", &url, &[]);

        let mut body = json!({ "text": text });
        if let Some(target) = in_reply_to {
            body["reply"] = json!({ "in_reply_to_tweet_id": target.to_string() });
        }

        let response = HTTP_CLIENT
            .post(&url)
            .header("Authorization", auth)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("Failed to reach X post endpoint")?;
        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &response_text));
        }

        let parsed: CreateTweetResponse =
            serde_json::from_str(&response_text).context("Failed to parse X post response")?;
        parsed
            .data
            .map(|created| created.id)
            .ok_or_else(|| anyhow!("Unexpected response format from X API: {}", response_text))
    }
}

#[async_trait]
impl MentionSource for XClient {
    async fn fetch_mentions(
        &self,
        self_id: &str,
        since: Option<MentionId>,
        max_results: usize,
    ) -> Result<MentionBatch> {
        let base_url = format!("{}/2/users/{}/mentions", self.api_base, urlencoding::encode(self_id));
        let url = format!("{}?{}", base_url, encode_query(&mentions_query(since, max_results)));

        log::info!("📡 Fetching mentions since {:?} (max {})...", since.map(|id| id.to_string()), max_results);

        let response = HTTP_CLIENT
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach X mentions endpoint")?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body).context("Mention fetch failed"));
        }
        parse_mentions(&body)
    }
}

#[async_trait]
impl Publisher for XClient {
    async fn publish(&self, text: &str, in_reply_to: Option<MentionId>) -> Result<String> {
        self.create_post(text, in_reply_to).await
    }
}

fn mentions_query(since: Option<MentionId>, max_results: usize) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("tweet.fields", "author_id,conversation_id,created_at".to_string()),
        ("expansions", "author_id".to_string()),
        ("user.fields", "username".to_string()),
        ("max_results", max_results.to_string()),
    ];
    if let Some(id) = since {
        params.push(("since_id", id.to_string()));
    }
    params
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn parse_mentions(body: &str) -> Result<MentionBatch> {
    let parsed: MentionsResponse =
        serde_json::from_str(body).context("Failed to parse X mentions response")?;

    let authors = parsed
        .includes
        .unwrap_or_default()
        .users
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    let mentions = parsed
        .data
        .into_iter()
        .map(|t| Mention {
            id: t.id,
            author_id: t.author_id.unwrap_or_default(),
            text: t.text,
        })
        .collect();

    Ok(MentionBatch { mentions, authors })
}

fn api_error(status: u16, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        let mut messages: Vec<String> = parsed
            .errors
            .into_iter()
            .filter_map(|e| e.message.or(e.detail))
            .collect();
        if messages.is_empty() {
            if let Some(detail) = parsed.detail.or(parsed.title) {
                messages.push(detail);
            }
        }
        if !messages.is_empty() {
            return anyhow!("X API error ({}): {}", status, messages.join("; "));
        }
    }
    anyhow!("X API error ({}): {}", status, body.trim())
}
