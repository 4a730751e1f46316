use chirp::agent::{Bot, CycleMode};
use chirp::config::{Config, CONFIG_FILE, mask_secret};
use chirp::init;
use chirp::mentions::StopReason;
use chirp::rhythm;
use chirp::state::CursorStore;

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser, Debug)]
#[command(author, version, about = "Chirp - scheduled X mention responder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Home directory holding chirp.yml and the cursor (default: ~/.chirp)
    #[arg(long, global = true)]
    home: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Post once, then answer new mentions (default)
    Run,
    /// Only publish an original post
    Post,
    /// Only answer new mentions
    Mentions,
    /// Keep running cycles on a cron schedule until Ctrl-C
    Schedule {
        /// Cron expression, five or six fields (default: schedule.cron)
        #[arg(long)]
        cron: Option<String>,
    },
    /// Write a template chirp.yml into the home directory
    Init,
    /// Show the effective configuration with secrets masked
    Check,
    /// Print the persisted cursor
    State,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    let home = init::resolve_home(args.home)?;
    let command = args.command.unwrap_or(Commands::Run);

    if let Commands::Init = command {
        if init::initialize_home(&home)? {
            println!("✨ Wrote template configuration to {:?}", home.join(CONFIG_FILE));
        } else {
            println!("📖 Configuration already present at {:?}", home.join(CONFIG_FILE));
        }
        return Ok(());
    }

    let config = Config::load_with_env(&home)?;

    match command {
        Commands::Check => {
            print_config(&config, &home);
            match config.validate() {
                Ok(()) => println!("✅ Configuration is complete."),
                Err(e) => println!("❌ {}", e),
            }
            Ok(())
        }
        Commands::State => {
            let store = CursorStore::new(config.state_path(&home));
            let state = store.load();
            println!("📍 Cursor file: {:?}", store.path());
            println!("{}", serde_json::to_string_pretty(&state)?);
            println!("{} replied mention(s) retained", state.replied_ids.len());
            Ok(())
        }
        Commands::Schedule { cron } => {
            let cron = cron.unwrap_or_else(|| config.schedule.cron.clone());
            let bot = Arc::new(Bot::new(config, &home)?);
            let stop = Arc::new(AtomicBool::new(false));
            rhythm::run_rhythm(bot, &cron, stop).await
        }
        Commands::Run => run_once(config, &home, CycleMode::Full).await,
        Commands::Post => run_once(config, &home, CycleMode::PostOnly).await,
        Commands::Mentions => run_once(config, &home, CycleMode::MentionsOnly).await,
        Commands::Init => Ok(()),
    }
}

async fn run_once(config: Config, home: &Path, mode: CycleMode) -> anyhow::Result<()> {
    let bot = Bot::new(config, home).context("Refusing to start")?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("🛑 Ctrl-C received, finishing the current mention before saving...");
            stop_signal.store(true, Ordering::SeqCst);
        }
    });

    let report = bot.run(mode, &stop).await?;
    let elapsed = chrono::Local::now() - report.started_at;
    println!(
        "Replies sent: {} in {}s{}",
        report.replies_sent,
        elapsed.num_seconds(),
        report
            .main_post_id
            .map(|id| format!(" | main post {}", id))
            .unwrap_or_default()
    );
    match report.stop {
        Some(StopReason::ReplyCap) => println!("🧮 Reply cap reached, remaining mentions wait for the next run."),
        Some(StopReason::Shutdown) => println!("🛑 Stopped early, the cursor was saved."),
        _ => {}
    }
    Ok(())
}

fn print_config(config: &Config, home: &Path) {
    let secret = |value: &str| {
        if value.is_empty() {
            "<unset>".to_string()
        } else {
            mask_secret(value)
        }
    };

    println!("🏠 Home: {:?}", home);
    println!("📍 State: {:?} (retention {})", config.state_path(home), config.state.retention);
    println!("🎯 Niche: {}", config.bot.niche);
    println!("🎨 Style: {}", config.bot.style);
    println!(
        "🧮 Max replies per run: {} | post each run: {}",
        config.bot.max_replies_per_run, config.bot.post_each_run
    );
    println!("🔑 X api key: {}", secret(&config.x.api_key));
    println!("🔑 X api secret: {}", secret(&config.x.api_secret));
    println!("🔑 X access token: {}", secret(&config.x.access_token));
    println!("🔑 X access token secret: {}", secret(&config.x.access_token_secret));
    println!("🔑 X bearer token: {}", secret(&config.x.bearer_token));
    for provider in &config.llm.providers {
        println!(
            "🤖 {} [{}]: {}",
            provider.kind.label(),
            provider.model(),
            secret(&provider.api_key)
        );
    }
    println!("💓 Schedule: {}", config.schedule.cron);
}
