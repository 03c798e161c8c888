//! Contributor history snapshots
//!
//! Runs the session-time analysis and records the running totals at a fixed
//! interval, producing a time series per contributor. The terminal render
//! shows the final standings; `--csv` dumps the full series for plotting
//! elsewhere.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clap::{value_parser, Arg, ArgMatches};

use super::contributors::ContributorAnalysis;
use super::{format_minutes, top_by_minutes, AnalysisRegistration, MessageAnalysis};
use crate::client::ChatClient;
use crate::error::Result;
use crate::messages::{Message, UserId};
use crate::resolver::TimeSpan;

#[derive(Debug)]
pub struct ContributorHistoryAnalysis {
    inner: ContributorAnalysis,
    interval: Duration,
    snapshot_times: Vec<DateTime<Utc>>,
    series: HashMap<UserId, Vec<f64>>,
    next_snapshot: Option<DateTime<Utc>>,
    last_ts: Option<DateTime<Utc>>,
    csv_path: Option<PathBuf>,
}

impl ContributorHistoryAnalysis {
    pub fn new(inner: ContributorAnalysis, interval_days: i64, csv_path: Option<PathBuf>) -> Self {
        Self {
            inner,
            interval: Duration::days(interval_days),
            snapshot_times: Vec::new(),
            series: HashMap::new(),
            next_snapshot: None,
            last_ts: None,
            csv_path,
        }
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self::new(
            ContributorAnalysis::from_matches(matches),
            matches
                .get_one::<i64>("snapshot-interval")
                .copied()
                .unwrap_or(28),
            matches.get_one::<PathBuf>("csv").cloned(),
        )
    }

    pub fn snapshot_times(&self) -> &[DateTime<Utc>] {
        &self.snapshot_times
    }

    pub fn series(&self) -> &HashMap<UserId, Vec<f64>> {
        &self.series
    }

    /// Append the current totals as one snapshot. Contributors first seen
    /// now get zero-padded history so every series stays aligned.
    fn take_snapshot(&mut self, date: DateTime<Utc>) {
        let len = self.snapshot_times.len();
        for (&author, &minutes) in self.inner.totals() {
            self.series
                .entry(author)
                .or_insert_with(|| vec![0.0; len])
                .push(minutes);
        }
        self.snapshot_times.push(date);
    }

    fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["timestamp", "user_id", "minutes"])?;

        let mut users: Vec<UserId> = self.series.keys().copied().collect();
        users.sort();

        for (i, time) in self.snapshot_times.iter().enumerate() {
            for &user in &users {
                let minutes = self
                    .series
                    .get(&user)
                    .and_then(|s| s.get(i))
                    .copied()
                    .unwrap_or(0.0);
                writer.write_record([
                    time.to_rfc3339(),
                    user.to_string(),
                    format!("{minutes:.1}"),
                ])?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl MessageAnalysis for ContributorHistoryAnalysis {
    fn prepare(&mut self) {
        self.inner.prepare();
        self.snapshot_times.clear();
        self.series.clear();
        self.next_snapshot = None;
        self.last_ts = None;
    }

    fn on_message(&mut self, message: &Message) {
        self.inner.on_message(message);
        self.last_ts = Some(message.time);

        let due = match self.next_snapshot {
            None => message.time,
            Some(next) if message.time < next => return,
            Some(next) => next,
        };
        self.take_snapshot(due);
        self.next_snapshot = Some(due + self.interval);
    }

    fn finalize(&mut self) {
        self.inner.finalize();
        if let Some(last) = self.last_ts {
            self.take_snapshot(last);
        }
    }

    async fn render(
        &self,
        client: &dyn ChatClient,
        span: &TimeSpan,
        max_results: usize,
    ) -> Result<()> {
        println!();
        println!("Top contributors over time {}", span.describe());

        if self.snapshot_times.is_empty() {
            println!("(no data)");
            return Ok(());
        }

        println!(
            "{} snapshots at {}-day intervals",
            self.snapshot_times.len(),
            self.interval.num_days()
        );
        for (i, (user, minutes)) in top_by_minutes(self.inner.totals(), max_results)
            .into_iter()
            .enumerate()
        {
            println!(
                "{}. {}: {}",
                i + 1,
                client.username(user).await?,
                format_minutes(minutes)
            );
        }

        if let Some(path) = &self.csv_path {
            self.write_csv(path)?;
            println!("Series written to {}", path.display());
        }
        Ok(())
    }
}

pub fn registration() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "contributor-history",
        about: "Track contributor standings over time",
        augment: |cmd| {
            ContributorAnalysis::augment(cmd)
                .arg(
                    Arg::new("snapshot-interval")
                        .long("snapshot-interval")
                        .value_name("DAYS")
                        .value_parser(value_parser!(i64))
                        .default_value("28")
                        .help("Time between data snapshots in days"),
                )
                .arg(
                    Arg::new("csv")
                        .long("csv")
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the full snapshot series to a CSV file"),
                )
        },
        build: |matches| Box::new(ContributorHistoryAnalysis::from_matches(matches)),
    }
}
