/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/lib.rs
 * Responsibility: Shared library modules
 */

pub mod agent;
pub mod config;
pub mod init;
pub mod llm;
pub mod mentions;
pub mod oauth;
pub mod prompts;
pub mod rhythm;
pub mod state;
pub mod x_api;

use once_cell::sync::Lazy;

/// Connection pool shared by the LLM and X adapters. Timeouts are set per request.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("chirp/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});
