//! Missing-person report
//!
//! Finds members who used to contribute a lot but have gone quiet: the
//! session-time totals filtered to authors whose last message is older than
//! the inactivity threshold, measured against the end of the scanned stream.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clap::{value_parser, Arg, ArgMatches};

use super::contributors::ContributorAnalysis;
use super::{format_minutes, print_ranked, top_by_minutes, AnalysisRegistration, MessageAnalysis};
use crate::client::ChatClient;
use crate::error::Result;
use crate::messages::{Message, UserId};
use crate::resolver::TimeSpan;

#[derive(Debug)]
pub struct MissingPersonAnalysis {
    inner: ContributorAnalysis,
    threshold: Duration,
    last_seen: HashMap<UserId, DateTime<Utc>>,
    last_ts: Option<DateTime<Utc>>,
    missing: HashMap<UserId, f64>,
}

impl MissingPersonAnalysis {
    pub fn new(inner: ContributorAnalysis, threshold_days: i64) -> Self {
        Self {
            inner,
            threshold: Duration::days(threshold_days),
            last_seen: HashMap::new(),
            last_ts: None,
            missing: HashMap::new(),
        }
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self::new(
            ContributorAnalysis::from_matches(matches),
            matches
                .get_one::<i64>("inactivity-threshold")
                .copied()
                .unwrap_or(90),
        )
    }

    /// Session minutes of the contributors deemed inactive. Populated by
    /// `finalize`.
    pub fn missing(&self) -> &HashMap<UserId, f64> {
        &self.missing
    }
}

#[async_trait]
impl MessageAnalysis for MissingPersonAnalysis {
    fn prepare(&mut self) {
        self.inner.prepare();
        self.last_seen.clear();
        self.last_ts = None;
        self.missing.clear();
    }

    fn on_message(&mut self, message: &Message) {
        self.inner.on_message(message);
        self.last_seen.insert(message.author, message.time);
        self.last_ts = Some(message.time);
    }

    fn finalize(&mut self) {
        self.inner.finalize();

        let Some(end) = self.last_ts else {
            return;
        };
        for (&author, &minutes) in self.inner.totals() {
            let seen = match self.last_seen.get(&author) {
                Some(&seen) => seen,
                None => continue,
            };
            if end - seen >= self.threshold {
                self.missing.insert(author, minutes);
            }
        }
    }

    async fn render(
        &self,
        client: &dyn ChatClient,
        span: &TimeSpan,
        max_results: usize,
    ) -> Result<()> {
        let rows: Vec<(UserId, String)> = top_by_minutes(&self.missing, max_results)
            .into_iter()
            .map(|(user, minutes)| (user, format_minutes(minutes)))
            .collect();
        print_ranked(
            client,
            "Top contributors with no recent activity",
            span,
            &rows,
        )
        .await
    }
}

pub fn registration() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "missing-persons",
        about: "Find top contributors who have gone quiet",
        augment: |cmd| {
            ContributorAnalysis::augment(cmd).arg(
                Arg::new("inactivity-threshold")
                    .long("inactivity-threshold")
                    .value_name("DAYS")
                    .value_parser(value_parser!(i64))
                    .default_value("90")
                    .help("Days of silence before a contributor counts as missing"),
            )
        },
        build: |matches| Box::new(MissingPersonAnalysis::from_matches(matches)),
    }
}
