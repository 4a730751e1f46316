/*
 * Chirp - Scheduled Mention Responder
 * File Path: src/rhythm.rs
 * Responsibility: The Rhythm. Pulses full cycles on a cron schedule, one at a time.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::agent::{Bot, CycleMode};

/// Six-field cron (seconds first), as tokio-cron-scheduler expects.
pub fn normalize_cron(expr: &str) -> anyhow::Result<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => anyhow::bail!("Cron expression `{}` has {} fields, expected 5, 6 or 7", expr, n),
    }
}

/// A tick that lands while a cycle is still running is dropped.
async fn pulse(bot: &Bot, gate: &Mutex<()>, stop: &AtomicBool) {
    let Ok(_running) = gate.try_lock() else {
        log::warn!("⏳ Previous cycle still running, skipping this tick.");
        return;
    };
    if stop.load(Ordering::SeqCst) {
        return;
    }
    if let Err(e) = bot.run(CycleMode::Full, stop).await {
        log::error!("❌ Cycle failed: {:#}", e);
    }
}

pub async fn run_rhythm(bot: Arc<Bot>, cron_expr: &str, stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let cron_expr = normalize_cron(cron_expr)?;
    let mut sched = JobScheduler::new().await?;
    let gate = Arc::new(Mutex::new(()));

    let job_bot = bot.clone();
    let job_gate = gate.clone();
    let job_stop = stop.clone();
    let job = Job::new_async(cron_expr.as_str(), move |_uuid, _l| {
        let bot = job_bot.clone();
        let gate = job_gate.clone();
        let stop = job_stop.clone();
        Box::pin(async move {
            pulse(&bot, &gate, &stop).await;
        })
    })?;

    let job_id = sched.add(job).await?;
    sched.start().await?;
    log::info!("💓 The Rhythm is pulsing [{}] (job {})", cron_expr, job_id);

    tokio::signal::ctrl_c().await?;
    log::info!("🛑 Stop requested, letting the current cycle persist its cursor...");
    stop.store(true, Ordering::SeqCst);

    let _drained = gate.lock().await;
    sched.shutdown().await?;
    log::info!("👋 The Rhythm has stopped.");
    Ok(())
}
