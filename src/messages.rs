//! Message records and snowflake ID handling
//!
//! All Discord entities are addressed by snowflake IDs. A snowflake embeds
//! its creation time in the upper 42 bits, which lets the scraper convert
//! between pagination cursors and datetimes without extra API calls.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch at the Discord epoch (2015-01-01T00:00:00Z).
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

macro_rules! snowflake_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake_id!(
    /// A text channel.
    ChannelId
);
snowflake_id!(
    /// A server (guild), a collection of channels.
    ServerId
);
snowflake_id!(
    /// A message author or reacting user.
    UserId
);
snowflake_id!(
    /// A single message.
    MessageId
);

/// Extract the creation time embedded in a snowflake.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    let millis = (id >> 22) + DISCORD_EPOCH_MS;
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Build the smallest snowflake whose embedded time is not before `time`.
///
/// Times before the Discord epoch clamp to zero.
pub fn time_to_snowflake(time: DateTime<Utc>) -> u64 {
    let millis = time.timestamp_millis().max(0) as u64;
    millis.saturating_sub(DISCORD_EPOCH_MS) << 22
}

/// Largest snowflake whose embedded time is `time` (millisecond precision).
///
/// Used as an exclusive pagination cursor: "after" this value skips every
/// message in the cursor's millisecond, so an already-consumed message is
/// never fetched twice.
pub fn snowflake_cursor(time: DateTime<Utc>) -> u64 {
    let millis = time.timestamp_millis().max(0) as u64;
    ((millis.saturating_sub(DISCORD_EPOCH_MS) + 1) << 22) - 1
}

/// One message record as seen by analyses. Read-only once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: UserId,
    pub time: DateTime<Utc>,
    pub content: String,
    /// Emoji name -> users who reacted with it.
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<UserId>>,
    /// Users mentioned in the message body.
    #[serde(default)]
    pub mentions: Vec<UserId>,
    /// The message this one replies to, if any.
    #[serde(default)]
    pub reference: Option<MessageId>,
}

impl Message {
    /// The set of users this message addresses via mentions.
    pub fn mentioned_users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.mentions.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_time_known_value() {
        // Snowflake 175928847299117063 decodes to 2016-04-30 11:18:25.796 UTC
        // (the worked example from the Discord API docs).
        let time = snowflake_time(175_928_847_299_117_063);
        assert_eq!(time.timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn test_snowflake_zero_is_discord_epoch() {
        let time = snowflake_time(0);
        assert_eq!(time.timestamp_millis() as u64, DISCORD_EPOCH_MS);
    }

    #[test]
    fn test_time_to_snowflake_round_trip() {
        let time = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 6, 15, 12, 30, 0).unwrap();
        let id = time_to_snowflake(time);
        assert_eq!(snowflake_time(id), time);
    }

    #[test]
    fn test_time_to_snowflake_clamps_before_epoch() {
        let time = chrono::TimeZone::with_ymd_and_hms(&Utc, 2010, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(time_to_snowflake(time), 0);
    }

    #[test]
    fn test_snowflake_ordering_follows_time() {
        let early = chrono::TimeZone::with_ymd_and_hms(&Utc, 2023, 1, 1, 0, 0, 0).unwrap();
        let late = chrono::TimeZone::with_ymd_and_hms(&Utc, 2023, 1, 2, 0, 0, 0).unwrap();
        assert!(time_to_snowflake(early) < time_to_snowflake(late));
    }

    #[test]
    fn test_snowflake_cursor_excludes_own_millisecond() {
        let time = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 6, 15, 12, 30, 0).unwrap();
        let cursor = snowflake_cursor(time);
        // Any snowflake stamped in the same millisecond is <= the cursor.
        assert!(time_to_snowflake(time) <= cursor);
        assert_eq!(snowflake_time(cursor), time);
        // The next millisecond starts right above it.
        assert!(snowflake_time(cursor + 1) > time);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(ChannelId(468923220607762485).to_string(), "468923220607762485");
        assert_eq!(UserId(7).to_string(), "7");
    }

    #[test]
    fn test_message_serde_round_trip() {
        let mut reactions = BTreeMap::new();
        reactions.insert("kekw".to_string(), vec![UserId(1), UserId(2)]);

        let message = Message {
            id: MessageId(100),
            channel: ChannelId(200),
            author: UserId(300),
            time: chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 1, 1, 9, 0, 0).unwrap(),
            content: "hello".to_string(),
            reactions,
            mentions: vec![UserId(400)],
            reference: Some(MessageId(99)),
        };

        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, message.id);
        assert_eq!(back.author, message.author);
        assert_eq!(back.reactions["kekw"], vec![UserId(1), UserId(2)]);
        assert_eq!(back.reference, Some(MessageId(99)));
    }

    #[test]
    fn test_message_defaults_for_optional_fields() {
        // Old cache files may predate the reactions/mentions fields.
        let json = r#"{
            "id": 1, "channel": 2, "author": 3,
            "time": "2024-01-01T00:00:00Z", "content": "hi"
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert!(message.reactions.is_empty());
        assert!(message.mentions.is_empty());
        assert!(message.reference.is_none());
    }
}
