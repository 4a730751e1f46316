/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/prompts.rs
 * Responsibility: Prompt assembly for original posts and mention replies.
 */

pub const SYSTEM_PROMPT: &str = "You are an elite X growth strategist and writer. \
Write high-signal content that earns followers by teaching practical insights, \
clear opinions, and actionable frameworks. Keep it human, specific, and not clickbait.";

/// Voice of the account: what it talks about and how.
#[derive(Debug, Clone)]
pub struct Persona {
    pub niche: String,
    pub style: String,
}

impl Persona {
    pub fn main_post_prompt(&self) -> String {
        format!(
            "Niche: {}\nStyle: {}\n\n\
             Write one X post under 280 chars that delivers real value and sparks discussion. \
             Prefer concrete lessons, short frameworks, or contrarian-but-true insights. \
             Do not use emojis unless essential.",
            self.niche, self.style
        )
    }

    pub fn reply_prompt(&self, author_handle: &str, original_text: &str) -> String {
        format!(
            "Niche: {}\nStyle: {}\nReplying to @{} who wrote: {}\n\n\
             Write a helpful, friendly reply under 260 chars that adds value and encourages engagement. \
             No generic fluff. No hashtags unless highly relevant.",
            self.niche, self.style, author_handle, original_text
        )
    }
}
