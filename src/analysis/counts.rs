//! Count-based analyses
//!
//! One accumulator shape (user -> count), several ways of attributing a
//! message to users. The variants are a sum type so the fold stays in one
//! place.

use async_trait::async_trait;
use clap::{Arg, ArgMatches, Command};

use super::{print_ranked, AnalysisRegistration, Leaderboard, MessageAnalysis};
use crate::client::ChatClient;
use crate::error::Result;
use crate::messages::{Message, UserId};
use crate::resolver::TimeSpan;

#[derive(Debug, Clone)]
pub enum CountKind {
    /// Messages per author.
    Messages,
    /// Reactions handed out, any emoji.
    ReactionsGiven,
    /// Reactions received on own messages, any emoji.
    ReactionsReceived,
    /// Reactions of one emoji received.
    ReactionReceived { emoji: String },
    /// Reactions of one emoji given.
    ReactionGiven { emoji: String },
    /// Authors reacting to their own message with a kek-family emoji.
    SelfKek,
}

impl CountKind {
    fn title(&self) -> String {
        match self {
            CountKind::Messages => "Top contributors by message count".to_string(),
            CountKind::ReactionsGiven => "Members with most reactions given".to_string(),
            CountKind::ReactionsReceived => "Members with most reactions received".to_string(),
            CountKind::ReactionReceived { emoji } => format!("Members by {emoji} received"),
            CountKind::ReactionGiven { emoji } => format!("Members by {emoji} given"),
            CountKind::SelfKek => "Top self kek offenders".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct CountAnalysis {
    kind: CountKind,
    board: Leaderboard,
}

impl CountAnalysis {
    pub fn new(kind: CountKind) -> Self {
        Self {
            kind,
            board: Leaderboard::default(),
        }
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.board
    }
}

#[async_trait]
impl MessageAnalysis for CountAnalysis {
    fn prepare(&mut self) {
        self.board.clear();
    }

    fn on_message(&mut self, message: &Message) {
        match &self.kind {
            CountKind::Messages => self.board.add(message.author, 1),
            CountKind::ReactionsGiven => {
                for users in message.reactions.values() {
                    for &user in users {
                        self.board.add(user, 1);
                    }
                }
            }
            CountKind::ReactionsReceived => {
                for users in message.reactions.values() {
                    self.board.add(message.author, users.len() as u64);
                }
            }
            CountKind::ReactionReceived { emoji } => {
                if let Some(users) = message.reactions.get(emoji) {
                    self.board.add(message.author, users.len() as u64);
                }
            }
            CountKind::ReactionGiven { emoji } => {
                if let Some(users) = message.reactions.get(emoji) {
                    for &user in users {
                        self.board.add(user, 1);
                    }
                }
            }
            CountKind::SelfKek => {
                for (name, users) in &message.reactions {
                    if name.contains("kek") && users.contains(&message.author) {
                        self.board.add(message.author, 1);
                    }
                }
            }
        }
    }

    fn finalize(&mut self) {
        // Counts are already final.
    }

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
        print_ranked(client, &self.kind.title(), span, &rows).await
    }
}

fn react_arg(cmd: Command, help: &'static str) -> Command {
    cmd.arg(
        Arg::new("react")
            .long("react")
            .value_name("EMOJI")
            .required(true)
            .help(help),
    )
}

fn emoji_from(matches: &ArgMatches) -> String {
    matches.get_one::<String>("react").cloned().unwrap_or_default()
}

pub fn message_count() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "message-count",
        about: "Rank contributors by number of messages",
        augment: |cmd| cmd,
        build: |_| Box::new(CountAnalysis::new(CountKind::Messages)),
    }
}

pub fn reactions_given() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "total-reactions-given",
        about: "Rank members by reactions given, any emoji",
        augment: |cmd| cmd,
        build: |_| Box::new(CountAnalysis::new(CountKind::ReactionsGiven)),
    }
}

pub fn reactions_received() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "total-reactions-received",
        about: "Rank members by reactions received, any emoji",
        augment: |cmd| cmd,
        build: |_| Box::new(CountAnalysis::new(CountKind::ReactionsReceived)),
    }
}

pub fn reaction_received_count() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "reaction-received-count",
        about: "Rank members by one emoji received",
        augment: |cmd| react_arg(cmd, "Emoji to count received reactions for"),
        build: |matches| {
            Box::new(CountAnalysis::new(CountKind::ReactionReceived {
                emoji: emoji_from(matches),
            }))
        },
    }
}

pub fn reaction_given_count() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "reaction-given-count",
        about: "Rank members by one emoji given",
        augment: |cmd| react_arg(cmd, "Emoji to count given reactions for"),
        build: |matches| {
            Box::new(CountAnalysis::new(CountKind::ReactionGiven {
                emoji: emoji_from(matches),
            }))
        },
    }
}

pub fn self_kek() -> AnalysisRegistration {
    AnalysisRegistration {
        name: "self-kek",
        about: "Rank authors who kek their own messages",
        augment: |cmd| cmd,
        build: |_| Box::new(CountAnalysis::new(CountKind::SelfKek)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ChannelId, MessageId};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn msg(id: u64, author: u64) -> Message {
        Message {
            id: MessageId(id),
            channel: ChannelId(1),
            author: UserId(author),
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32 % 60).unwrap(),
            content: String::new(),
            reactions: BTreeMap::new(),
            mentions: Vec::new(),
            reference: None,
        }
    }

    fn with_reaction(mut message: Message, emoji: &str, users: &[u64]) -> Message {
        message
            .reactions
            .entry(emoji.to_string())
            .or_default()
            .extend(users.iter().map(|&u| UserId(u)));
        message
    }

    fn run(analysis: &mut CountAnalysis, messages: &[Message]) {
        analysis.prepare();
        for message in messages {
            analysis.on_message(message);
        }
        analysis.finalize();
    }

    #[test]
    fn test_message_count_per_author() {
        let mut analysis = CountAnalysis::new(CountKind::Messages);
        run(
            &mut analysis,
            &[msg(1, 1), msg(2, 1), msg(3, 1), msg(4, 2), msg(5, 2)],
        );
        assert_eq!(analysis.leaderboard().get(UserId(1)), 3);
        assert_eq!(analysis.leaderboard().get(UserId(2)), 2);
    }

    #[test]
    fn test_reactions_given_counts_each_user() {
        let mut analysis = CountAnalysis::new(CountKind::ReactionsGiven);
        let message = with_reaction(
            with_reaction(msg(1, 1), "heart", &[2, 3]),
            "fire",
            &[2],
        );
        run(&mut analysis, &[message]);
        assert_eq!(analysis.leaderboard().get(UserId(2)), 2);
        assert_eq!(analysis.leaderboard().get(UserId(3)), 1);
        assert_eq!(analysis.leaderboard().get(UserId(1)), 0);
    }

    #[test]
    fn test_reactions_received_credits_author() {
        let mut analysis = CountAnalysis::new(CountKind::ReactionsReceived);
        let message = with_reaction(msg(1, 7), "heart", &[2, 3]);
        run(&mut analysis, &[message]);
        assert_eq!(analysis.leaderboard().get(UserId(7)), 2);
    }

    #[test]
    fn test_specific_emoji_received_ignores_others() {
        let mut analysis = CountAnalysis::new(CountKind::ReactionReceived {
            emoji: "fire".to_string(),
        });
        let message = with_reaction(
            with_reaction(msg(1, 7), "heart", &[2, 3]),
            "fire",
            &[4],
        );
        run(&mut analysis, &[message]);
        assert_eq!(analysis.leaderboard().get(UserId(7)), 1);
    }

    #[test]
    fn test_specific_emoji_given_credits_reactor() {
        let mut analysis = CountAnalysis::new(CountKind::ReactionGiven {
            emoji: "fire".to_string(),
        });
        let message = with_reaction(
            with_reaction(msg(1, 7), "heart", &[2]),
            "fire",
            &[4, 5],
        );
        run(&mut analysis, &[message]);
        assert_eq!(analysis.leaderboard().get(UserId(4)), 1);
        assert_eq!(analysis.leaderboard().get(UserId(5)), 1);
        assert_eq!(analysis.leaderboard().get(UserId(2)), 0);
    }

    #[test]
    fn test_self_kek_requires_author_in_kek_reaction() {
        let mut analysis = CountAnalysis::new(CountKind::SelfKek);
        let offender = with_reaction(msg(1, 7), "kekw", &[7, 2]);
        let innocent = with_reaction(msg(2, 8), "kekw", &[2]);
        let wrong_emoji = with_reaction(msg(3, 9), "heart", &[9]);
        run(&mut analysis, &[offender, innocent, wrong_emoji]);
        assert_eq!(analysis.leaderboard().get(UserId(7)), 1);
        assert_eq!(analysis.leaderboard().get(UserId(8)), 0);
        assert_eq!(analysis.leaderboard().get(UserId(9)), 0);
    }

    #[test]
    fn test_prepare_resets_counts() {
        let mut analysis = CountAnalysis::new(CountKind::Messages);
        run(&mut analysis, &[msg(1, 1)]);
        run(&mut analysis, &[msg(2, 2)]);
        assert_eq!(analysis.leaderboard().get(UserId(1)), 0);
        assert_eq!(analysis.leaderboard().get(UserId(2)), 1);
    }
}
