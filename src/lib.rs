//! RocketScrape Library
//!
//! This library provides tools to:
//! - Scrape Discord channel history through the REST API
//! - Cache scraped messages on disk so re-runs only fetch the gaps
//! - Resolve named channels/servers and time windows into message streams
//! - Run pluggable analyses over the stream (contributor time, message and
//!   reaction counts, thank-you mentions, activity history)

pub mod analysis;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod resolver;

// Re-export common types
pub use analysis::{registry, AnalysisRegistration, MessageAnalysis};
pub use cache::{CacheLock, MessageCache};
pub use client::{ChannelHandle, ChatClient, DiscordClient, HistoryCursor};
pub use config::Config;
pub use error::{Error, Result};
pub use messages::{ChannelId, Message, MessageId, ServerId, UserId};
pub use resolver::TimeSpan;
