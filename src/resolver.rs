//! Message source resolution
//!
//! Turns user-supplied channel/server references and time bounds into a
//! concrete list of channels to scan. Reference parsing is pure: bad
//! identifiers fail before any network access. Only server expansion talks
//! to the client.

use chrono::{DateTime, Utc};

use crate::client::{ChannelHandle, ChatClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::messages::{ChannelId, ServerId};

/// An optional `[start, end)` window over message timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSpan {
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: Option<DateTime<Utc>>,
}

impl TimeSpan {
    /// Validate and build a span. `start == end` is a valid empty interval.
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(Error::InvalidTimeRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    pub fn all_time() -> Self {
        Self::default()
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| time >= s) && self.end.map_or(true, |e| time < e)
    }

    /// Human-readable range description used in rendered headers.
    pub fn describe(&self) -> String {
        const FMT: &str = "%Y-%m-%d %H:%M:%S";
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                format!("from {} to {}", start.format(FMT), end.format(FMT))
            }
            (Some(start), None) => format!("since {}", start.format(FMT)),
            (None, Some(end)) => format!("up to {}", end.format(FMT)),
            (None, None) => "(all time)".to_string(),
        }
    }
}

/// Parse a channel reference: config name first, then raw snowflake.
pub fn parse_channel_ref(config: &Config, reference: &str) -> Result<ChannelHandle> {
    if let Some(&id) = config.channels.get(reference) {
        return Ok(ChannelHandle::new(
            ChannelId(id),
            Some(reference.to_string()),
        ));
    }
    if let Ok(id) = reference.parse::<u64>() {
        return Ok(ChannelHandle::new(ChannelId(id), None));
    }
    Err(Error::UnknownChannelOrServer(reference.to_string()))
}

/// Parse a server reference: config name first, then raw snowflake.
pub fn parse_server_ref(config: &Config, reference: &str) -> Result<ServerId> {
    if let Some(&id) = config.servers.get(reference) {
        return Ok(ServerId(id));
    }
    if let Ok(id) = reference.parse::<u64>() {
        return Ok(ServerId(id));
    }
    Err(Error::UnknownChannelOrServer(reference.to_string()))
}

/// Expand channel references or a server reference into an ordered,
/// de-duplicated channel list. `-c` and `--server` are mutually exclusive;
/// the CLI enforces that before this runs.
pub async fn resolve_channels(
    client: &dyn ChatClient,
    config: &Config,
    channel_refs: &[String],
    server_ref: Option<&str>,
) -> Result<Vec<ChannelHandle>> {
    if let Some(reference) = server_ref {
        let server = parse_server_ref(config, reference)?;
        let channels = client.server_channels(server).await?;
        if channels.is_empty() {
            return Err(Error::UnknownChannelOrServer(reference.to_string()));
        }
        return Ok(channels);
    }

    // Parse everything up front so a bad reference fails before any fetch.
    let mut channels = Vec::with_capacity(channel_refs.len());
    for reference in channel_refs {
        channels.push(parse_channel_ref(config, reference)?);
    }

    let mut seen = std::collections::HashSet::new();
    channels.retain(|c| seen.insert(c.id));
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::messages::{Message, UserId};

    struct NoNetworkClient;

    #[async_trait]
    impl ChatClient for NoNetworkClient {
        async fn server_channels(&self, _server: ServerId) -> Result<Vec<ChannelHandle>> {
            panic!("resolver touched the network");
        }

        async fn history_page(
            &self,
            _channel: ChannelId,
            _after: Option<crate::client::HistoryCursor>,
            _limit: usize,
        ) -> Result<Vec<Message>> {
            panic!("resolver touched the network");
        }

        async fn username(&self, _user: UserId) -> Result<String> {
            panic!("resolver touched the network");
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_span_rejects_inverted_range() {
        let err = TimeSpan::new(Some(at(2024, 2, 1)), Some(at(2024, 1, 1))).unwrap_err();
        assert!(matches!(err, Error::InvalidTimeRange { .. }));
    }

    #[test]
    fn test_span_accepts_empty_interval() {
        let span = TimeSpan::new(Some(at(2024, 1, 1)), Some(at(2024, 1, 1))).unwrap();
        assert!(!span.contains(at(2024, 1, 1)));
    }

    #[test]
    fn test_span_contains_is_half_open() {
        let span = TimeSpan::new(Some(at(2024, 1, 1)), Some(at(2024, 2, 1))).unwrap();
        assert!(span.contains(at(2024, 1, 1)));
        assert!(span.contains(at(2024, 1, 15)));
        assert!(!span.contains(at(2024, 2, 1)));
        assert!(!span.contains(at(2023, 12, 31)));
    }

    #[test]
    fn test_span_describe_variants() {
        assert_eq!(TimeSpan::all_time().describe(), "(all time)");

        let since = TimeSpan::new(Some(at(2024, 1, 1)), None).unwrap();
        assert!(since.describe().starts_with("since 2024-01-01"));

        let until = TimeSpan::new(None, Some(at(2024, 2, 1))).unwrap();
        assert!(until.describe().starts_with("up to 2024-02-01"));

        let both = TimeSpan::new(Some(at(2024, 1, 1)), Some(at(2024, 2, 1))).unwrap();
        assert!(both.describe().contains("from"));
        assert!(both.describe().contains("to"));
    }

    #[test]
    fn test_parse_channel_ref_named() {
        let config = Config::defaults();
        let handle = parse_channel_ref(&config, "support").unwrap();
        assert_eq!(handle.id, ChannelId(468_923_220_607_762_485));
        assert_eq!(handle.name.as_deref(), Some("support"));
    }

    #[test]
    fn test_parse_channel_ref_raw_id() {
        let config = Config::defaults();
        let handle = parse_channel_ref(&config, "1234567890").unwrap();
        assert_eq!(handle.id, ChannelId(1_234_567_890));
        assert!(handle.name.is_none());
    }

    #[test]
    fn test_parse_channel_ref_unknown() {
        let config = Config::defaults();
        let err = parse_channel_ref(&config, "definitely-not-a-channel").unwrap_err();
        assert!(matches!(err, Error::UnknownChannelOrServer(ref s) if s.contains("definitely")));
    }

    #[test]
    fn test_parse_server_ref_named_and_raw() {
        let config = Config::defaults();
        assert!(parse_server_ref(&config, "rocket-pool").is_ok());
        assert_eq!(parse_server_ref(&config, "42").unwrap(), ServerId(42));
        assert!(parse_server_ref(&config, "no-such-server").is_err());
    }

    #[tokio::test]
    async fn test_resolve_channels_no_network_for_plain_refs() {
        let config = Config::defaults();
        let refs = vec!["support".to_string(), "general".to_string()];
        let channels = resolve_channels(&NoNetworkClient, &config, &refs, None)
            .await
            .unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name.as_deref(), Some("support"));
    }

    #[tokio::test]
    async fn test_resolve_channels_dedup_preserves_order() {
        let config = Config::defaults();
        let refs = vec![
            "support".to_string(),
            "468923220607762485".to_string(), // same channel by raw ID
            "general".to_string(),
        ];
        let channels = resolve_channels(&NoNetworkClient, &config, &refs, None)
            .await
            .unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name.as_deref(), Some("support"));
        assert_eq!(channels[1].name.as_deref(), Some("general"));
    }

    #[tokio::test]
    async fn test_resolve_channels_bad_ref_fails_before_network() {
        let config = Config::defaults();
        let refs = vec!["support".to_string(), "bogus!".to_string()];
        // NoNetworkClient panics on any call, so an error here proves the
        // reference check ran first.
        let err = resolve_channels(&NoNetworkClient, &config, &refs, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownChannelOrServer(_)));
    }

    #[tokio::test]
    async fn test_resolve_channels_bad_server_fails_before_network() {
        let config = Config::defaults();
        let err = resolve_channels(&NoNetworkClient, &config, &[], Some("not-a-server"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownChannelOrServer(_)));
    }
}
