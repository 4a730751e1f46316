/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/mentions.rs
 * Responsibility: The Responder. Walks a fetched batch of mentions in id order, replies at most
 * once per mention, and folds what it saw into the next cursor.
 */

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::llm::ContentGenerator;
use crate::prompts::{Persona, SYSTEM_PROMPT};
use crate::state::{CursorState, MentionId};

/// Handle used when the fetch response carried no user record for the author.
pub const UNKNOWN_HANDLE: &str = "creator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub id: MentionId,
    pub author_id: String,
    pub text: String,
}

/// One fetch worth of mentions plus the author id -> handle table from the expansions.
#[derive(Debug, Clone, Default)]
pub struct MentionBatch {
    pub mentions: Vec<Mention>,
    pub authors: HashMap<String, String>,
}

impl MentionBatch {
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    pub fn handle_for(&self, author_id: &str) -> &str {
        self.authors
            .get(author_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_HANDLE)
    }
}

#[async_trait]
pub trait MentionSource: Send + Sync {
    /// Mentions of `self_id` strictly newer than `since`, or all available when `since` is `None`.
    async fn fetch_mentions(
        &self,
        self_id: &str,
        since: Option<MentionId>,
        max_results: usize,
    ) -> anyhow::Result<MentionBatch>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Returns the id of the created post.
    async fn publish(&self, text: &str, in_reply_to: Option<MentionId>) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Generate,
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionOutcome {
    Replied { reply_id: String, text: String },
    AlreadyReplied,
    OwnMention,
    Failed { stage: FailedStage, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    ReplyCap,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ReplyPolicy<'a> {
    pub self_id: &'a str,
    pub max_replies: usize,
    pub retention: usize,
}

/// Collaborators needed to turn an eligible mention into a sent reply.
pub struct Responder<'a> {
    pub persona: &'a Persona,
    pub generator: &'a dyn ContentGenerator,
    pub publisher: &'a dyn Publisher,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub replies_sent: usize,
    pub cursor: CursorState,
    pub outcomes: Vec<(MentionId, MentionOutcome)>,
    pub stop: StopReason,
}

impl RunResult {
    /// Failed mentions the cursor has already moved past. The next fetch will not return them.
    pub fn stranded(&self) -> Vec<MentionId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, MentionOutcome::Failed { .. }))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Size hint for the mentions endpoint, which accepts 5..=100.
pub fn fetch_size_hint(max_replies: usize) -> usize {
    max_replies.saturating_mul(3).clamp(5, 100)
}

pub async fn process_mentions(
    cursor: CursorState,
    batch: MentionBatch,
    policy: &ReplyPolicy<'_>,
    responder: &Responder<'_>,
    stop: &AtomicBool,
) -> RunResult {
    let mut mentions = batch.mentions.clone();
    mentions.sort_by_key(|m| m.id);

    let CursorState {
        last_seen_id: mut latest,
        mut replied_ids,
    } = cursor;
    let mut replied: HashSet<MentionId> = replied_ids.iter().copied().collect();
    let mut replies_sent = 0;
    let mut outcomes = Vec::with_capacity(mentions.len());
    let mut stop_reason = StopReason::Exhausted;

    for mention in &mentions {
        if policy.max_replies == 0 {
            stop_reason = StopReason::ReplyCap;
            break;
        }
        if stop.load(Ordering::SeqCst) {
            log::warn!("🛑 Shutdown requested, stopping before mention {}.", mention.id);
            stop_reason = StopReason::Shutdown;
            break;
        }

        latest = Some(latest.map_or(mention.id, |seen| seen.max(mention.id)));

        let handle = batch.handle_for(&mention.author_id);
        let outcome = respond_to(mention, handle, policy, responder, &replied).await;

        match &outcome {
            MentionOutcome::Replied { reply_id, text } => {
                replied.insert(mention.id);
                replied_ids.push(mention.id);
                replies_sent += 1;
                log::info!("✅ Replied to mention {} as {}: {}", mention.id, reply_id, text);
            }
            MentionOutcome::AlreadyReplied => {
                log::debug!("⏭️ Mention {} already has a reply.", mention.id);
            }
            MentionOutcome::OwnMention => {
                log::debug!("⏭️ Mention {} is our own post.", mention.id);
            }
            MentionOutcome::Failed { stage, reason } => {
                log::warn!("❌ Failed replying to {} ({:?}): {}", mention.id, stage, reason);
            }
        }
        outcomes.push((mention.id, outcome));

        if replies_sent >= policy.max_replies {
            log::info!("🧮 Reply cap of {} reached, leaving the rest for the next run.", policy.max_replies);
            stop_reason = StopReason::ReplyCap;
            break;
        }
    }

    let mut next = CursorState {
        last_seen_id: latest,
        replied_ids,
    };
    next.compact(policy.retention);

    RunResult {
        replies_sent,
        cursor: next,
        outcomes,
        stop: stop_reason,
    }
}

async fn respond_to(
    mention: &Mention,
    handle: &str,
    policy: &ReplyPolicy<'_>,
    responder: &Responder<'_>,
    replied: &HashSet<MentionId>,
) -> MentionOutcome {
    if replied.contains(&mention.id) {
        return MentionOutcome::AlreadyReplied;
    }
    if mention.author_id == policy.self_id {
        return MentionOutcome::OwnMention;
    }

    let prompt = responder.persona.reply_prompt(handle, &mention.text);
    let text = match responder.generator.generate(SYSTEM_PROMPT, &prompt).await {
        Ok(text) => text,
        Err(e) => {
            return MentionOutcome::Failed {
                stage: FailedStage::Generate,
                reason: format!("{:#}", e),
            };
        }
    };

    match responder.publisher.publish(&text, Some(mention.id)).await {
        Ok(reply_id) => MentionOutcome::Replied { reply_id, text },
        Err(e) => MentionOutcome::Failed {
            stage: FailedStage::Send,
            reason: format!("{:#}", e),
        },
    }
}
