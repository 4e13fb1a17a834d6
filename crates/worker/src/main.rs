mod cli;
mod command;
mod jobfile;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use tickwork_scheduler::{parse_duration, CronExpr, LogLevel, Scheduler, SchedulerConfig, TaskEvent};

use crate::cli::{CheckArgs, CliArgs, Command, NextArgs, RunArgs};
use crate::jobfile::JobFile;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = CliArgs::parse();

    match args.command {
        Command::Run(run_args) => run(run_args).await,
        Command::Check(check_args) => {
            init_tracing(LogLevel::Warn);
            check(check_args)
        }
        Command::Next(next_args) => {
            init_tracing(LogLevel::Warn);
            next(next_args)
        }
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str())),
        )
        .with_target(false)
        .init();
}

fn apply_overrides(config: &mut SchedulerConfig, args: &RunArgs) -> Result<()> {
    if let Some(n) = args.max_workers {
        config.max_workers = n;
    }
    if let Some(n) = args.queue_size {
        config.queue_size = n;
    }
    if let Some(ref grace) = args.shutdown_grace {
        config.shutdown_grace = parse_duration(grace)
            .with_context(|| format!("invalid --shutdown-grace '{grace}'"))?;
    }
    if let Some(ref level) = args.log_level {
        config.log_level = level
            .parse()
            .map_err(anyhow::Error::msg)
            .context("invalid --log-level")?;
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let mut jobs = JobFile::load(&args.config)?;
    apply_overrides(&mut jobs.scheduler, &args)?;
    init_tracing(jobs.scheduler.log_level);
    jobs.validate()?;

    let scheduler = Scheduler::new(jobs.scheduler.clone()).context("failed to create scheduler")?;
    for spec in &jobs.tasks {
        let task = spec
            .build_task()
            .with_context(|| format!("task '{}'", spec.id))?;
        scheduler.add_task(task)?;
    }

    let mut events = scheduler.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    scheduler.start()?;
    info!(
        config = %args.config.display(),
        tasks = jobs.tasks.len(),
        "tickwork-worker running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    scheduler.stop().await;
    logger.abort();

    let stats = scheduler.get_scheduler_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn log_event(event: &TaskEvent) {
    match &event.outcome {
        Ok(value) => info!(
            task = %event.task_id,
            attempt = event.attempt,
            duration_ms = event.duration.as_millis() as u64,
            result = %value,
            "Task succeeded"
        ),
        Err(e) => warn!(
            task = %event.task_id,
            attempt = event.attempt,
            duration_ms = event.duration.as_millis() as u64,
            final_attempt = event.settled,
            error = %e,
            "Task failed"
        ),
    }
}

fn check(args: CheckArgs) -> Result<()> {
    let jobs = JobFile::load(&args.config)?;
    jobs.validate()?;
    println!(
        "{}: ok ({} tasks, max_workers={}, queue_size={})",
        args.config.display(),
        jobs.tasks.len(),
        jobs.scheduler.max_workers,
        jobs.scheduler.queue_size
    );
    Ok(())
}

fn next(args: NextArgs) -> Result<()> {
    let cron = CronExpr::parse(&args.cron)?;
    let times = cron.upcoming(chrono::Utc::now(), args.count);
    if times.is_empty() {
        println!("'{}' never fires", cron);
    }
    for t in times {
        println!("{}", t.to_rfc3339());
    }
    Ok(())
}
