//! Discord REST API client
//!
//! The scraper never talks to the network directly; everything goes through
//! the [`ChatClient`] trait so analyses and the cache can be exercised with
//! a mock in tests. [`DiscordClient`] is the real implementation over the
//! Discord REST API (v10). Rate limiting and retries are the platform's
//! concern; a failed request aborts the run.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::messages::{
    snowflake_cursor, snowflake_time, time_to_snowflake, ChannelId, Message, MessageId, ServerId,
    UserId,
};

const DISCORD_API_URL: &str = "https://discord.com/api/v10";

/// Largest page size the messages endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 100;

/// A channel the resolver selected for scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: ChannelId,
    /// Human-readable name, when known (config entry or server listing).
    pub name: Option<String>,
}

impl ChannelHandle {
    pub fn new(id: ChannelId, name: Option<String>) -> Self {
        Self { id, name }
    }

    /// `#name` when the name is known, the raw ID otherwise.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("#{}", name),
            None => self.id.to_string(),
        }
    }
}

/// Pagination position for history fetches. Always exclusive: the next page
/// starts strictly after the position.
///
/// A `Message` cursor resumes at exactly the next message, which is the only
/// safe way to cross a page boundary — timestamps are not unique, so two
/// messages stamped in the same millisecond can straddle a page. Time cursors
/// are for cache-segment bounds and have millisecond granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCursor {
    /// Strictly after this message.
    Message(MessageId),
    /// At the first message stamped at or after this time.
    From(DateTime<Utc>),
    /// After the last message stamped at or before this time.
    Through(DateTime<Utc>),
}

impl HistoryCursor {
    /// The exclusive `after` snowflake this position maps to.
    pub fn to_snowflake(self) -> u64 {
        match self {
            HistoryCursor::Message(id) => id.0,
            HistoryCursor::From(time) => time_to_snowflake(time).saturating_sub(1),
            HistoryCursor::Through(time) => snowflake_cursor(time),
        }
    }
}

/// Read-only chat platform operations the scraper depends on.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Enumerate the text channels of a server.
    async fn server_channels(&self, server: ServerId) -> Result<Vec<ChannelHandle>>;

    /// Fetch one page of messages strictly after `after`, oldest first.
    /// `None` starts at the beginning of history. A page shorter than
    /// `limit` means the history is exhausted.
    async fn history_page(
        &self,
        channel: ChannelId,
        after: Option<HistoryCursor>,
        limit: usize,
    ) -> Result<Vec<Message>>;

    /// Resolve a user ID to a display name.
    async fn username(&self, user: UserId) -> Result<String>;
}

/// Discord REST client.
#[derive(Debug)]
pub struct DiscordClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    usernames: Mutex<HashMap<UserId, String>>,
}

impl DiscordClient {
    /// Create a client with the given user token.
    pub fn new<S: Into<String>>(token: S) -> Result<Self> {
        Self::with_base_url(token, DISCORD_API_URL)
    }

    /// Create a client against a custom endpoint (used by tests).
    pub fn with_base_url<S: Into<String>>(token: S, base_url: &str) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::MissingToken);
        }

        let http = reqwest::Client::builder()
            .user_agent("rocketscrape/0.1.0")
            .build()
            .map_err(|e| Error::Client(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            usernames: Mutex::new(HashMap::new()),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .http
            .get(url.clone())
            .header("Authorization", &self.token)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Client(format!(
                "{} returned {}: {}",
                url.path(),
                status,
                text
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Client(format!("invalid response from {}: {}", url.path(), e)))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| Error::Client(format!("invalid URL: {}", e)))
    }

    /// Fetch the users behind each reaction on a message.
    ///
    /// The messages endpoint only reports counts, so this is at least one
    /// extra call per distinct emoji. Reaction-heavy scans are the reason
    /// the on-disk cache exists.
    async fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &str,
    ) -> Result<Vec<UserId>> {
        let mut users: Vec<UserId> = Vec::new();
        loop {
            let mut url = self
                .endpoint(&format!("/channels/{}/messages/{}/reactions", channel, message))?;
            url.path_segments_mut()
                .map_err(|_| Error::Client("cannot-be-a-base URL".to_string()))?
                .push(emoji);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("limit", &MAX_PAGE_SIZE.to_string());
                // The user list pages by user ID, ascending.
                let after = users.last().map_or(0, |u| u.0);
                query.append_pair("after", &after.to_string());
            }

            let page: Vec<WireUser> = self.get_json(url).await?;
            let page_len = page.len();
            users.extend(page.into_iter().map(|u| UserId(u.id.parse().unwrap_or(0))));
            if page_len < MAX_PAGE_SIZE {
                return Ok(users);
            }
        }
    }

    async fn convert_message(&self, wire: WireMessage) -> Result<Message> {
        let channel = ChannelId(wire.channel_id.parse().unwrap_or(0));
        let id = MessageId(wire.id.parse().unwrap_or(0));

        let mut reactions = std::collections::BTreeMap::new();
        for reaction in wire.reactions.unwrap_or_default() {
            let Some(name) = reaction.emoji.name else {
                continue;
            };
            let users = self.reaction_users(channel, id, &name).await?;
            reactions.insert(name, users);
        }

        let time = wire
            .timestamp
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| snowflake_time(id.0));

        Ok(Message {
            id,
            channel,
            author: UserId(wire.author.id.parse().unwrap_or(0)),
            time,
            content: wire.content,
            reactions,
            mentions: wire
                .mentions
                .unwrap_or_default()
                .into_iter()
                .map(|u| UserId(u.id.parse().unwrap_or(0)))
                .collect(),
            reference: wire
                .message_reference
                .and_then(|r| r.message_id)
                .and_then(|id| id.parse().ok())
                .map(MessageId),
        })
    }
}

#[async_trait]
impl ChatClient for DiscordClient {
    async fn server_channels(&self, server: ServerId) -> Result<Vec<ChannelHandle>> {
        let url = self.endpoint(&format!("/guilds/{}/channels", server))?;
        let channels: Vec<WireChannel> = self.get_json(url).await?;

        Ok(channels
            .into_iter()
            .filter(|c| c.kind == CHANNEL_TYPE_TEXT || c.kind == CHANNEL_TYPE_ANNOUNCEMENT)
            .map(|c| ChannelHandle::new(ChannelId(c.id.parse().unwrap_or(0)), c.name))
            .collect())
    }

    async fn history_page(
        &self,
        channel: ChannelId,
        after: Option<HistoryCursor>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let mut url = self.endpoint(&format!("/channels/{}/messages", channel))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.min(MAX_PAGE_SIZE).to_string());
            // "after" keeps the endpoint in forward-pagination mode; 0 is
            // the beginning of history.
            let after = after.map_or(0, HistoryCursor::to_snowflake);
            query.append_pair("after", &after.to_string());
        }

        let mut page: Vec<WireMessage> = self.get_json(url).await?;
        // The endpoint returns newest-first; the scraper wants oldest-first.
        page.sort_by_key(|m| m.id.parse::<u64>().unwrap_or(0));

        let mut messages = Vec::with_capacity(page.len());
        for wire in page {
            messages.push(self.convert_message(wire).await?);
        }
        Ok(messages)
    }

    async fn username(&self, user: UserId) -> Result<String> {
        if let Some(name) = self.usernames.lock().await.get(&user) {
            return Ok(name.clone());
        }

        let name = match self.endpoint(&format!("/users/{}", user)) {
            Ok(url) => match self.get_json::<WireUser>(url).await {
                Ok(wire) => wire.global_name.unwrap_or(wire.username),
                Err(err) => {
                    warn!(%user, "username lookup failed: {}", err);
                    user.to_string()
                }
            },
            Err(err) => {
                warn!(%user, "username lookup failed: {}", err);
                user.to_string()
            }
        };

        self.usernames.lock().await.insert(user, name.clone());
        Ok(name)
    }
}

const CHANNEL_TYPE_TEXT: u8 = 0;
const CHANNEL_TYPE_ANNOUNCEMENT: u8 = 5;

// Wire types: Discord serializes snowflakes as strings.

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEmoji {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReaction {
    emoji: WireEmoji,
}

#[derive(Debug, Deserialize)]
struct WireReference {
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    channel_id: String,
    author: WireUser,
    content: String,
    timestamp: String,
    #[serde(default)]
    reactions: Option<Vec<WireReaction>>,
    #[serde(default)]
    mentions: Option<Vec<WireUser>>,
    #[serde(default)]
    message_reference: Option<WireReference>,
}
