//! On-disk message cache
//!
//! History fetches are expensive (one request per 100 messages, plus one per
//! distinct reaction emoji), so every fetched window is persisted under
//! `<cache_dir>/<channel_id>.json` and replayed on later runs. The file holds
//! a sorted list of non-overlapping segments; each commit merges the freshly
//! fetched window with any segments it overlaps, so repeated runs over
//! adjacent ranges converge to one segment per channel.

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{ChatClient, HistoryCursor, MAX_PAGE_SIZE};
use crate::config::CACHE_LOCK_FILE;
use crate::error::{Error, Result};
use crate::messages::{ChannelId, Message};
use crate::resolver::TimeSpan;

/// Pending messages are flushed to disk after this many fetches.
const COMMIT_THRESHOLD: usize = 10_000;

/// A contiguous fetched window: every message in `[start, end]` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Segment {
    /// Absorb overlapping segments, interleaving messages by time.
    /// `others` must be in ascending order; ties keep `self`'s messages first.
    fn absorb(&mut self, others: Vec<Segment>) {
        let Some(first) = others.first() else {
            return;
        };
        self.start = self.start.min(first.start);
        if let Some(last) = others.last() {
            self.end = self.end.max(last.end);
        }

        let mine = std::mem::take(&mut self.messages);
        let theirs: Vec<Message> = others.into_iter().flat_map(|s| s.messages).collect();

        let mut merged = Vec::with_capacity(mine.len() + theirs.len());
        let mut a = mine.into_iter().peekable();
        let mut b = theirs.into_iter().peekable();
        loop {
            match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => {
                    if x.time <= y.time {
                        merged.extend(a.next());
                    } else {
                        merged.extend(b.next());
                    }
                }
                (Some(_), None) => merged.extend(a.next()),
                (None, Some(_)) => merged.extend(b.next()),
                (None, None) => break,
            }
        }
        self.messages = merged;
    }
}

/// Per-channel cache of fetched history.
#[derive(Debug)]
pub struct MessageCache {
    channel: ChannelId,
    /// None disables persistence (--no-cache).
    dir: Option<PathBuf>,
    segments: Vec<Segment>,
    pending: Vec<Message>,
}

impl MessageCache {
    /// Open (or start) the cache for a channel. A missing or unreadable
    /// cache file just means an empty cache.
    pub fn open(dir: &Path, channel: ChannelId) -> Self {
        let segments = Self::load(dir, channel).unwrap_or_default();
        debug!(%channel, segments = segments.len(), "opened message cache");
        Self {
            channel,
            dir: Some(dir.to_path_buf()),
            segments,
            pending: Vec::new(),
        }
    }

    /// A cache that never reads or writes disk.
    pub fn disabled(channel: ChannelId) -> Self {
        Self {
            channel,
            dir: None,
            segments: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn load(dir: &Path, channel: ChannelId) -> Option<Vec<Segment>> {
        let content = fs::read_to_string(dir.join(format!("{}.json", channel))).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn file_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.json", self.channel))
    }

    fn backup_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_backup.json", self.channel))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Stream every message in `span` through `sink`, oldest first, each
    /// exactly once. Cached segments are replayed from disk; the gaps between
    /// them are fetched from the client and recorded for next time.
    pub async fn history<F>(
        &mut self,
        client: &dyn ChatClient,
        span: &TimeSpan,
        mut sink: F,
    ) -> Result<()>
    where
        F: FnMut(&Message),
    {
        let mut cursor = span.start.map(HistoryCursor::From);

        let segments = self.segments.clone();
        for segment in segments {
            // Segment entirely before the requested window: skip.
            if let Some(start) = span.start {
                if start > segment.end {
                    continue;
                }
            }

            // Fill the gap between the last delivered message and this segment.
            if self
                .fill_gap(client, &mut cursor, Some(segment.start), span, &mut sink)
                .await?
            {
                return self.commit(span.start, span.end);
            }

            for message in &segment.messages {
                if let Some(end) = span.end {
                    if message.time >= end {
                        return self.commit(span.start, span.end);
                    }
                }
                if span.start.map_or(true, |s| message.time >= s) {
                    sink(message);
                }
            }
            // The segment's coverage claim extends through its end time.
            cursor = Some(HistoryCursor::Through(segment.end));
        }

        // Fill from the last segment to the end of the window.
        self.fill_gap(client, &mut cursor, None, span, &mut sink)
            .await?;
        self.commit(span.start, span.end)
    }

    /// Fetch pages after `cursor` until `before` (a cached segment boundary)
    /// or the span end is reached. Returns true when the span end was hit.
    ///
    /// The cursor advances by message ID, not time: two messages stamped in
    /// the same millisecond may straddle a page boundary, and a time cursor
    /// would skip the second one.
    async fn fill_gap<F>(
        &mut self,
        client: &dyn ChatClient,
        cursor: &mut Option<HistoryCursor>,
        before: Option<DateTime<Utc>>,
        span: &TimeSpan,
        sink: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&Message),
    {
        loop {
            let page = client
                .history_page(self.channel, *cursor, MAX_PAGE_SIZE)
                .await
                .map_err(|e| e.in_channel(self.channel))?;
            let page_len = page.len();

            for message in page {
                if let Some(boundary) = before {
                    // From here on the cached segment takes over.
                    if message.time >= boundary {
                        return Ok(false);
                    }
                }
                if let Some(end) = span.end {
                    if message.time >= end {
                        return Ok(true);
                    }
                }
                *cursor = Some(HistoryCursor::Message(message.id));
                sink(&message);
                self.push_pending(span, message)?;
            }

            if page_len < MAX_PAGE_SIZE {
                return Ok(false);
            }
        }
    }

    fn push_pending(&mut self, span: &TimeSpan, message: Message) -> Result<()> {
        if self.dir.is_none() {
            return Ok(());
        }
        self.pending.push(message);
        if self.pending.len() >= COMMIT_THRESHOLD {
            info!(
                channel = %self.channel,
                "committing {} new messages to disk",
                self.pending.len()
            );
            let last = self.pending.last().map(|m| m.time);
            self.commit(span.start, last)?;
        }
        Ok(())
    }

    /// Fold the pending messages into the segment list as a window covering
    /// `[start, end]` and persist. An empty pending set with a known end
    /// still commits: it records that the window holds no messages.
    fn commit(&mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
        if self.dir.is_none() {
            self.pending.clear();
            return Ok(());
        }
        if end.is_none() && self.pending.is_empty() {
            return Ok(());
        }

        let start = start.unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default());
        let end = match end.or_else(|| self.pending.last().map(|m| m.time)) {
            Some(end) => end,
            None => return Ok(()),
        };

        let mut low = None;
        let mut high = None;
        let mut successor = None;
        for (i, segment) in self.segments.iter().enumerate() {
            if end < segment.start {
                if successor.is_none() {
                    successor = Some(i);
                }
            } else if start <= segment.end {
                if low.is_none() {
                    low = Some(i);
                }
                high = Some(i);
            }
        }

        let mut fresh = Segment {
            start,
            end,
            messages: std::mem::take(&mut self.pending),
        };

        match (low, high) {
            (Some(low), Some(high)) => {
                let absorbed: Vec<Segment> = self.segments.drain(low..=high).collect();
                fresh.absorb(absorbed);
                self.segments.insert(low, fresh);
            }
            _ => match successor {
                Some(pos) => self.segments.insert(pos, fresh),
                None => self.segments.push(fresh),
            },
        }

        self.write()
    }

    fn write(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;

        let path = self.file_path(dir);
        let backup = self.backup_path(dir);

        if path.exists() {
            fs::rename(&path, &backup)?;
        }
        let file = File::create(&path)?;
        serde_json::to_writer(BufWriter::new(file), &self.segments)?;
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        Ok(())
    }
}

/// Exclusive lock on the cache directory. Two scraper processes sharing the
/// cache would race the backup-replace commit dance.
#[derive(Debug)]
pub struct CacheLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl CacheLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(CACHE_LOCK_FILE);
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                path,
            }),
            Err(_) => Err(Error::CacheLocked),
        }
    }

    pub fn release(&mut self) {
        if let Some(ref file) = self.lock_file {
            let _ = file.unlock();
        }
        self.lock_file = None;
        let _ = fs::remove_file(&self.path);
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        self.release();
    }
}
