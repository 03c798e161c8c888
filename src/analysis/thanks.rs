//! Thank-you mention counting
//!
//! A message that reads like a thank-you credits everyone it mentions, plus
//! the author of the message it replies to. Reply authors are looked up in
//! an author map accumulated over the stream, so only replies to messages
//! inside the scanned range resolve.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{print_ranked, AnalysisRegistration, Leaderboard, MessageAnalysis};
use crate::client::ChatClient;
use crate::error::Result;
use crate::messages::{Message, MessageId, UserId};
use crate::resolver::TimeSpan;

static THANKS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"((^| |\n)(ty)( |$|\n|\.|!))|(thank(s| you)?)|(thx)")
        .expect("thank-you pattern is valid")
});

#[derive(Debug, Default)]
pub struct ThankCountAnalysis {
    board: Leaderboard,
    authors: HashMap<MessageId, UserId>,
}

impl ThankCountAnalysis {
    pub fn leaderboard(&self) -> &Leaderboard {
        &self.board
    }
}

#[async_trait]
impl MessageAnalysis for ThankCountAnalysis {
    fn prepare(&mut self) {
        self.board.clear();
        self.authors.clear();
    }

    fn on_message(&mut self, message: &Message) {
        self.authors.insert(message.id, message.author);

        if !THANKS_PATTERN.is_match(&message.content.to_lowercase()) {
            return;
        }

        let mut thanked: HashSet<UserId> = message.mentioned_users().collect();
        if let Some(replied) = message.reference.and_then(|id| self.authors.get(&id)) {
            thanked.insert(*replied);
        }

        for user in thanked {
            self.board.add(user, 1);
        }
    }

    fn finalize(&mut self) {}

    async fn render(
        &self,
        client: &dyn ChatClient,
        span: &TimeSpan,
        max_results: usize,
    ) -> Result<()> {
        let rows: Vec<(UserId, String)> = self
            .board
            .top(max_results)
            .into_iter()
            .map(|(user, count)| (user, count.to_string()))
            .collect();
        print_ranked(client, "Members thanked most often", span, &rows).await
    }
}

pub fn registration() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "thank-count",
        about: "Rank members by how often they are thanked",
        augment: |cmd| cmd,
        build: |_| Box::<ThankCountAnalysis>::default(),
    }
}
