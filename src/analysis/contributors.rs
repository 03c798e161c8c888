//! Session-based contributor time analysis
//!
//! Messages from one author that follow each other within the session
//! timeout belong to one session. A closed session credits its wall-clock
//! span plus a base allowance, so a lone message is still worth something.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{value_parser, Arg, ArgMatches, Command};

use super::{format_minutes, print_ranked, top_by_minutes, AnalysisRegistration, MessageAnalysis};
use crate::client::ChatClient;
use crate::error::Result;
use crate::messages::{Message, UserId};
use crate::resolver::TimeSpan;

#[derive(Debug)]
pub struct ContributorAnalysis {
    base_session_time: f64,
    session_timeout: f64,
    open_sessions: HashMap<UserId, (DateTime<Utc>, DateTime<Utc>)>,
    total_time: HashMap<UserId, f64>,
}

impl ContributorAnalysis {
    pub fn new(base_session_time: f64, session_timeout: f64) -> Self {
        Self {
            base_session_time,
            session_timeout,
            open_sessions: HashMap::new(),
            total_time: HashMap::new(),
        }
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self::new(
            matches
                .get_one::<f64>("base-session-time")
                .copied()
                .unwrap_or(5.0),
            matches
                .get_one::<f64>("session-timeout")
                .copied()
                .unwrap_or(15.0),
        )
    }

    /// Session options, shared with the analyses that build on this one.
    pub fn augment(cmd: Command) -> Command {
        cmd.arg(
            Arg::new("base-session-time")
                .long("base-session-time")
                .value_name("MINUTES")
                .value_parser(value_parser!(f64))
                .default_value("5")
                .help("Minutes credited to every session on top of its span"),
        )
        .arg(
            Arg::new("session-timeout")
                .long("session-timeout")
                .value_name("MINUTES")
                .value_parser(value_parser!(f64))
                .default_value("15")
                .help("Silence in minutes that closes an author's session"),
        )
    }

    /// Accumulated minutes per author. Open sessions are folded in by
    /// `finalize`.
    pub fn totals(&self) -> &HashMap<UserId, f64> {
        &self.total_time
    }

    fn minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
        (b - a).num_milliseconds() as f64 / 60_000.0
    }

    fn close_session(&mut self, author: UserId, start: DateTime<Utc>, end: DateTime<Utc>) {
        let session = Self::minutes_between(start, end) + self.base_session_time;
        *self.total_time.entry(author).or_insert(0.0) += session;
    }
}

#[async_trait]
impl MessageAnalysis for ContributorAnalysis {
    fn prepare(&mut self) {
        self.open_sessions.clear();
        self.total_time.clear();
    }

    fn on_message(&mut self, message: &Message) {
        let timestamp = message.time;
        let author = message.author;

        let (start, end) = self
            .open_sessions
            .get(&author)
            .copied()
            .unwrap_or((timestamp, timestamp));

        if Self::minutes_between(end, timestamp) < self.session_timeout {
            self.open_sessions.insert(author, (start, timestamp));
        } else {
            // A timed-out message closes the previous session; the author's
            // next message opens a fresh one.
            self.open_sessions.remove(&author);
            self.close_session(author, start, end);
        }
    }

    fn finalize(&mut self) {
        let open: Vec<(UserId, (DateTime<Utc>, DateTime<Utc>))> =
            self.open_sessions.drain().collect();
        for (author, (start, end)) in open {
            self.close_session(author, start, end);
        }
    }

    async fn render(
        &self,
        client: &dyn ChatClient,
        span: &TimeSpan,
        max_results: usize,
    ) -> Result<()> {
        let rows: Vec<(UserId, String)> = top_by_minutes(&self.total_time, max_results)
            .into_iter()
            .map(|(user, minutes)| (user, format_minutes(minutes)))
            .collect();
        print_ranked(client, "Top contributors", span, &rows).await
    }
}

pub fn registration() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "contributors",
        about: "Rank contributors by estimated time spent in the channel",
        augment: ContributorAnalysis::augment,
        build: |matches| Box::new(ContributorAnalysis::from_matches(matches)),
    }
}
