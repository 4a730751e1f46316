use chirp::config::{LlmConfig, ProviderConfig, ProviderKind};
use chirp::llm::{LlmRouter, MAX_POST_CHARS};
use chirp::prompts::{Persona, SYSTEM_PROMPT};
use std::env;

#[tokio::test]
async fn test_openrouter_writes_a_post_sized_reply() {
    let api_key = match env::var("OPENROUTER_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            println!("skipping test: OPENROUTER_API_KEY not set");
            return;
        }
    };

    let config = LlmConfig {
        providers: vec![ProviderConfig {
            kind: ProviderKind::OpenRouter,
            api_key,
            model: String::new(),
            endpoint: None,
        }],
        ..LlmConfig::default()
    };
    let router = LlmRouter::from_config(&config);
    let persona = Persona {
        niche: "AI tools and automation".to_string(),
        style: "short, punchy, helpful".to_string(),
    };

    println!("🚀 Asking OpenRouter for a reply...");
    let result = router
        .complete(SYSTEM_PROMPT, &persona.reply_prompt("rustacean", "what should I automate first?"))
        .await;

    match result {
        Ok(text) => {
            println!("📥 Received: {}", text);
            assert!(!text.is_empty());
            assert!(text.chars().count() <= MAX_POST_CHARS);
        }
        Err(e) => panic!("OpenRouter call failed: {}", e),
    }
}
