/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/agent.rs
 * Responsibility: One run of the bot. Post, fetch, respond, persist.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::config::{Config, ConfigError};
use crate::llm::{ContentGenerator, LlmRouter};
use crate::mentions::{
    MentionBatch, MentionSource, Publisher, ReplyPolicy, Responder, RunResult, fetch_size_hint,
    StopReason, process_mentions,
};
use crate::prompts::{Persona, SYSTEM_PROMPT};
use crate::state::{CursorStore, MentionId};
use crate::x_api::XClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// Main post (when enabled) followed by mentions.
    Full,
    PostOnly,
    MentionsOnly,
}

/// Who we are on the platform. Kept apart from [`MentionSource`] so fakes stay small.
#[async_trait]
pub trait Identity: Send + Sync {
    async fn self_id(&self) -> Result<String>;
}

pub struct Collaborators<'a> {
    pub identity: &'a dyn Identity,
    pub source: &'a dyn MentionSource,
    pub publisher: &'a dyn Publisher,
    pub generator: &'a dyn ContentGenerator,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Local>,
    pub main_post_id: Option<String>,
    pub replies_sent: usize,
    pub last_seen_id: Option<MentionId>,
    /// `None` when the cycle did not look at mentions.
    pub stop: Option<StopReason>,
}

pub async fn post_main(
    persona: &Persona,
    generator: &dyn ContentGenerator,
    publisher: &dyn Publisher,
) -> Result<String> {
    let text = generator
        .generate(SYSTEM_PROMPT, &persona.main_post_prompt())
        .await
        .context("Failed to generate main post")?;
    let post_id = publisher
        .publish(&text, None)
        .await
        .context("Failed to publish main post")?;
    log::info!("📝 Posted main post: {} | {}", post_id, text);
    Ok(post_id)
}

/// Load, fetch, process, save. A fetch failure aborts before the cursor is touched.
pub async fn respond_to_mentions(
    config: &Config,
    store: &CursorStore,
    collab: &Collaborators<'_>,
    stop: &AtomicBool,
) -> Result<RunResult> {
    let cursor = store.load();
    let self_id = collab
        .identity
        .self_id()
        .await
        .context("Unable to verify X credentials")?;

    let batch: MentionBatch = collab
        .source
        .fetch_mentions(
            &self_id,
            cursor.last_seen_id,
            fetch_size_hint(config.bot.max_replies_per_run),
        )
        .await?;
    if batch.is_empty() {
        log::info!("📭 No new mentions.");
    } else {
        log::info!("📥 {} mention(s) fetched.", batch.mentions.len());
    }

    let persona = persona_of(config);
    let policy = ReplyPolicy {
        self_id: &self_id,
        max_replies: config.bot.max_replies_per_run,
        retention: config.state.retention,
    };
    let responder = Responder {
        persona: &persona,
        generator: collab.generator,
        publisher: collab.publisher,
    };

    let result = process_mentions(cursor, batch, &policy, &responder, stop).await;

    let stranded = result.stranded();
    if !stranded.is_empty() {
        let list: Vec<String> = stranded.iter().map(ToString::to_string).collect();
        log::warn!(
            "⚠️ The cursor moved past {} unanswered mention(s) that will not be fetched again: {}",
            stranded.len(),
            list.join(", ")
        );
    }

    store
        .save(&result.cursor)
        .with_context(|| format!("Failed to persist cursor to {:?}", store.path()))?;
    Ok(result)
}

pub async fn run_cycle(
    config: &Config,
    store: &CursorStore,
    mode: CycleMode,
    collab: &Collaborators<'_>,
    stop: &AtomicBool,
) -> Result<CycleReport> {
    let started_at = Local::now();
    log::info!("🚀 Cycle started at {}", started_at.format("%Y-%m-%d %H:%M:%S"));

    let mut report = CycleReport {
        started_at,
        main_post_id: None,
        replies_sent: 0,
        last_seen_id: None,
        stop: None,
    };

    let should_post = match mode {
        CycleMode::Full => config.bot.post_each_run,
        CycleMode::PostOnly => true,
        CycleMode::MentionsOnly => false,
    };
    if should_post {
        match post_main(&persona_of(config), collab.generator, collab.publisher).await {
            Ok(id) => report.main_post_id = Some(id),
            // Only the main post is lost; mentions still get their turn.
            Err(e) if mode == CycleMode::Full => log::error!("❌ {:#}", e),
            Err(e) => return Err(e),
        }
    }

    if mode != CycleMode::PostOnly {
        let result = respond_to_mentions(config, store, collab, stop).await?;
        report.replies_sent = result.replies_sent;
        report.last_seen_id = result.cursor.last_seen_id;
        report.stop = Some(result.stop);
    }

    log::info!(
        "🏁 Cycle finished: {} repl{} sent, cursor at {}.",
        report.replies_sent,
        if report.replies_sent == 1 { "y" } else { "ies" },
        report
            .last_seen_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    Ok(report)
}

fn persona_of(config: &Config) -> Persona {
    Persona {
        niche: config.bot.niche.clone(),
        style: config.bot.style.clone(),
    }
}

/// Validated configuration wired to the live X and LLM adapters.
pub struct Bot {
    config: Config,
    store: CursorStore,
    x: XClient,
    llm: LlmRouter,
    configured_user_id: Option<String>,
}

impl Bot {
    pub fn new(config: Config, home: &Path) -> Result<Self, ConfigError> {
        config.validate()?;
        let timeout = Duration::from_secs(config.llm.timeout_secs);
        Ok(Self {
            store: CursorStore::new(config.state_path(home)),
            x: XClient::from_config(&config.x, timeout),
            llm: LlmRouter::from_config(&config.llm),
            configured_user_id: config.x.user_id.clone(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, mode: CycleMode, stop: &AtomicBool) -> Result<CycleReport> {
        let collab = Collaborators {
            identity: self,
            source: &self.x,
            publisher: &self.x,
            generator: &self.llm,
        };
        run_cycle(&self.config, &self.store, mode, &collab, stop).await
    }
}

#[async_trait]
impl Identity for Bot {
    async fn self_id(&self) -> Result<String> {
        self.x.resolve_self_id(self.configured_user_id.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mentions::Mention;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FixedIdentity;

    #[async_trait]
    impl Identity for FixedIdentity {
        async fn self_id(&self) -> Result<String> {
            Ok("self".to_string())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl MentionSource for BrokenSource {
        async fn fetch_mentions(&self, _self_id: &str, _since: Option<MentionId>, _max: usize) -> Result<MentionBatch> {
            anyhow::bail!("X API error (503): Service Unavailable")
        }
    }

    struct OneMention;

    #[async_trait]
    impl MentionSource for OneMention {
        async fn fetch_mentions(&self, _self_id: &str, _since: Option<MentionId>, _max: usize) -> Result<MentionBatch> {
            Ok(MentionBatch {
                mentions: vec![Mention {
                    id: MentionId::new(77),
                    author_id: "someone".to_string(),
                    text: "hi".to_string(),
                }],
                authors: Default::default(),
            })
        }
    }

    struct Canned;

    #[async_trait]
    impl ContentGenerator for Canned {
        async fn generate(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
            if user_prompt.contains("Write one X post") {
                anyhow::bail!("main post generation is down");
            }
            Ok("reply".to_string())
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<Option<MentionId>>>);

    #[async_trait]
    impl Publisher for Outbox {
        async fn publish(&self, _text: &str, in_reply_to: Option<MentionId>) -> Result<String> {
            self.0.lock().unwrap().push(in_reply_to);
            Ok("created".to_string())
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_without_touching_state() {
        let dir = tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("state.json"));
        let outbox = Outbox::default();
        let collab = Collaborators {
            identity: &FixedIdentity,
            source: &BrokenSource,
            publisher: &outbox,
            generator: &Canned,
        };

        let result = run_cycle(&Config::default(), &store, CycleMode::MentionsOnly, &collab, &AtomicBool::new(false)).await;

        assert!(result.is_err());
        assert!(!store.path().exists());
        assert!(outbox.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_main_post_failure_does_not_block_mentions() {
        let dir = tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("state.json"));
        let outbox = Outbox::default();
        let collab = Collaborators {
            identity: &FixedIdentity,
            source: &OneMention,
            publisher: &outbox,
            generator: &Canned,
        };

        let report = run_cycle(&Config::default(), &store, CycleMode::Full, &collab, &AtomicBool::new(false))
            .await
            .unwrap();

        assert_eq!(report.main_post_id, None);
        assert_eq!(report.replies_sent, 1);
        assert_eq!(report.stop, Some(StopReason::Exhausted));
        assert_eq!(*outbox.0.lock().unwrap(), vec![Some(MentionId::new(77))]);
        assert!(store.load().has_replied(MentionId::new(77)));
    }

    #[tokio::test]
    async fn test_post_only_mode_surfaces_post_failure_and_skips_state() {
        let dir = tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("state.json"));
        let outbox = Outbox::default();
        let collab = Collaborators {
            identity: &FixedIdentity,
            source: &OneMention,
            publisher: &outbox,
            generator: &Canned,
        };

        let result = run_cycle(&Config::default(), &store, CycleMode::PostOnly, &collab, &AtomicBool::new(false)).await;

        assert!(result.is_err());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_failed_save_is_fatal_even_after_replies_went_out() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        std::fs::create_dir(&state_path).unwrap();
        let store = CursorStore::new(&state_path);
        let outbox = Outbox::default();
        let collab = Collaborators {
            identity: &FixedIdentity,
            source: &OneMention,
            publisher: &outbox,
            generator: &Canned,
        };

        let err = run_cycle(&Config::default(), &store, CycleMode::MentionsOnly, &collab, &AtomicBool::new(false))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to persist cursor"));
        assert_eq!(*outbox.0.lock().unwrap(), vec![Some(MentionId::new(77))]);
    }

    #[test]
    fn test_bot_refuses_incomplete_config() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Bot::new(Config::default(), dir.path()),
            Err(ConfigError::Missing(_))
        ));
    }
}
