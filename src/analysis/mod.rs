//! Analysis framework
//!
//! Every analysis is a strategy over one chronological pass of the message
//! stream: `prepare` resets the accumulator, `on_message` folds one message
//! in, `finalize` seals the result, `render` prints it. Variants register
//! themselves in an explicit registry built at startup; the CLI derives its
//! subcommands from it.

pub mod contributors;
pub mod counts;
pub mod history;
pub mod missing;
pub mod thanks;

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clap::{ArgMatches, Command};
use tracing::info;

use crate::cache::MessageCache;
use crate::client::{ChannelHandle, ChatClient};
use crate::error::{Error, Result};
use crate::messages::{Message, UserId};
use crate::resolver::TimeSpan;

/// One pluggable analysis over a message stream.
#[async_trait]
pub trait MessageAnalysis: Send {
    /// Reset accumulator state. Called once before any message is seen.
    fn prepare(&mut self);

    /// Fold one message into the accumulator. Messages arrive exactly once,
    /// in chronological order per channel.
    fn on_message(&mut self, message: &Message);

    /// Seal the accumulated state. Called exactly once, after the last
    /// message.
    fn finalize(&mut self);

    /// Print the sealed result, resolving display names via the client and
    /// truncating to `max_results` entries.
    async fn render(
        &self,
        client: &dyn ChatClient,
        span: &TimeSpan,
        max_results: usize,
    ) -> Result<()>;
}

/// Registry entry tying an analysis to its CLI subcommand.
#[derive(Debug)]
pub struct AnalysisRegistration {
    /// Subcommand keyword selecting this analysis.
    pub name: &'static str,
    pub about: &'static str,
    /// Adds the analysis-specific options to its subcommand.
    pub augment: fn(Command) -> Command,
    /// Builds the analysis from its parsed subcommand matches.
    pub build: fn(&ArgMatches) -> Box<dyn MessageAnalysis>,
}

/// All known analyses, in help-listing order.
pub fn registry() -> Vec<AnalysisRegistration> {
    vec![
        contributors::registration(),
        history::registration(),
        counts::message_count(),
        missing::registration(),
        thanks::registration(),
        counts::reactions_given(),
        counts::reactions_received(),
        counts::reaction_received_count(),
        counts::reaction_given_count(),
        counts::self_kek(),
    ]
}

/// Look up a registration by subcommand name.
pub fn find<'a>(
    registry: &'a [AnalysisRegistration],
    name: &str,
) -> Result<&'a AnalysisRegistration> {
    registry
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| Error::UnsupportedAnalysis(name.to_string()))
}

/// Drive one analysis over the resolved channels.
///
/// Client errors abort before `finalize`; the caller must not render
/// anything in that case.
pub async fn run_analysis(
    analysis: &mut dyn MessageAnalysis,
    client: &dyn ChatClient,
    channels: &[ChannelHandle],
    span: &TimeSpan,
    cache_dir: Option<&Path>,
    log_interval: Duration,
) -> Result<()> {
    analysis.prepare();

    let mut last_log = Instant::now();
    for channel in channels {
        info!(channel = %channel.label(), "scanning history {}", span.describe());

        let mut cache = match cache_dir {
            Some(dir) => MessageCache::open(dir, channel.id),
            None => MessageCache::disabled(channel.id),
        };
        cache
            .history(client, span, |message| {
                if last_log.elapsed() >= log_interval {
                    info!("message stream reached {}", message.time);
                    last_log = Instant::now();
                }
                analysis.on_message(message);
            })
            .await?;
    }

    analysis.finalize();
    Ok(())
}

/// Per-user counter shared by the count-based analyses.
#[derive(Debug, Default, Clone)]
pub struct Leaderboard {
    counts: HashMap<UserId, u64>,
}

impl Leaderboard {
    pub fn add(&mut self, user: UserId, n: u64) {
        *self.counts.entry(user).or_insert(0) += n;
    }

    pub fn get(&self, user: UserId) -> u64 {
        self.counts.get(&user).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Top `n` entries, highest count first, ties broken by user ID.
    pub fn top(&self, n: usize) -> Vec<(UserId, u64)> {
        let mut entries: Vec<(UserId, u64)> = self.counts.iter().map(|(&u, &c)| (u, c)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}

/// Top `n` entries of a float-valued accumulator, highest first, ties broken
/// by user ID for deterministic output.
pub fn top_by_minutes(map: &HashMap<UserId, f64>, n: usize) -> Vec<(UserId, f64)> {
    let mut entries: Vec<(UserId, f64)> = map.iter().map(|(&u, &v)| (u, v)).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    entries.truncate(n);
    entries
}

/// `205.4` minutes -> `"3h 25m"`.
pub fn format_minutes(minutes: f64) -> String {
    let total = minutes.round() as i64;
    format!("{}h {}m", total / 60, total % 60)
}

/// Common ranked-list printer: title, range line, numbered entries with
/// resolved usernames. An empty result prints a "no data" marker instead.
pub(crate) async fn print_ranked(
    client: &dyn ChatClient,
    title: &str,
    span: &TimeSpan,
    rows: &[(UserId, String)],
) -> Result<()> {
    println!();
    println!("{} {}", title, span.describe());
    if rows.is_empty() {
        println!("(no data)");
        return Ok(());
    }
    for (i, (user, value)) in rows.iter().enumerate() {
        println!("{}. {}: {}", i + 1, client.username(*user).await?, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_unique() {
        let registry = registry();
        let mut names: Vec<&str> = registry.iter().map(|r| r.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), registry.len());
    }

    #[test]
    fn test_registry_contains_core_analyses() {
        let registry = registry();
        for name in [
            "contributors",
            "contributor-history",
            "message-count",
            "missing-persons",
            "thank-count",
            "total-reactions-given",
            "total-reactions-received",
            "reaction-received-count",
            "reaction-given-count",
            "self-kek",
        ] {
            assert!(find(&registry, name).is_ok(), "missing analysis {name}");
        }
    }

    #[test]
    fn test_find_unknown_analysis() {
        let registry = registry();
        let err = find(&registry, "word-cloud").unwrap_err();
        assert!(matches!(err, Error::UnsupportedAnalysis(ref s) if s == "word-cloud"));
    }

    #[test]
    fn test_registration_is_debug_printable() {
        // `find` returns Result<&AnalysisRegistration>, so unwrap_err (and
        // assertion diagnostics generally) need the reference to be Debug.
        let registry = registry();
        let registration = find(&registry, "contributors").unwrap();
        assert!(format!("{registration:?}").contains("contributors"));
    }

    #[test]
    fn test_leaderboard_top_orders_by_count_then_id() {
        let mut board = Leaderboard::default();
        board.add(UserId(3), 5);
        board.add(UserId(1), 7);
        board.add(UserId(2), 5);

        let top = board.top(10);
        assert_eq!(top, vec![(UserId(1), 7), (UserId(2), 5), (UserId(3), 5)]);
    }

    #[test]
    fn test_leaderboard_top_truncates() {
        let mut board = Leaderboard::default();
        board.add(UserId(1), 3);
        board.add(UserId(2), 2);
        let top = board.top(1);
        assert_eq!(top, vec![(UserId(1), 3)]);
    }

    #[test]
    fn test_leaderboard_accumulates() {
        let mut board = Leaderboard::default();
        board.add(UserId(1), 1);
        board.add(UserId(1), 2);
        assert_eq!(board.get(UserId(1)), 3);
    }

    #[test]
    fn test_top_by_minutes_ordering() {
        let mut map = HashMap::new();
        map.insert(UserId(1), 10.5);
        map.insert(UserId(2), 99.0);
        map.insert(UserId(3), 10.5);

        let top = top_by_minutes(&map, 10);
        assert_eq!(top[0].0, UserId(2));
        assert_eq!(top[1].0, UserId(1));
        assert_eq!(top[2].0, UserId(3));
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0.0), "0h 0m");
        assert_eq!(format_minutes(59.4), "0h 59m");
        assert_eq!(format_minutes(60.0), "1h 0m");
        assert_eq!(format_minutes(205.4), "3h 25m");
        assert_eq!(format_minutes(1440.0), "24h 0m");
    }
}
