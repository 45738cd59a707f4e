use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

mod cli;
mod error;
mod models;
mod services;

use cli::{CommandArgs, SummaryFormat};
use models::{PatternOutcome, PidReport, RunReport};
use services::{CommandRunner, DumpScheduler, ProcessRunner};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();

    let report = match run(&args) {
        Ok(report) => report,
        Err(e) => {
            log::error!("❌ {}", e);
            for cause in e.chain().skip(1) {
                log::error!("     - {}", cause);
            }
            return ExitCode::FAILURE;
        }
    };

    match args.summary {
        SummaryFormat::Text => print_summary(&report),
        SummaryFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("Failed to render report: {}", e),
        },
    }

    if report.all_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(args: &CommandArgs) -> anyhow::Result<RunReport> {
    let config = args.run_configuration()?;
    let policy = args.scheduler_policy();

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "cannot create output directory {}",
            config.output_dir.display()
        )
    })?;

    let tool = config.tool_dir.join(&policy.tool_binary);
    if !tool.exists() && !tool.with_extension("exe").exists() {
        log::warn!(
            "⚠️  {} not found, every capture will fail until it exists",
            tool.display()
        );
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    let locator = args.locator.build(Arc::clone(&runner));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("stackdump")
        .build()
        .context("failed to start the async runtime")?;

    let scheduler = Arc::new(DumpScheduler::new(
        Arc::new(config),
        policy,
        locator,
        runner,
    ));
    let report = runtime.block_on(scheduler.run());

    // A hung capture tool must not keep the process alive past the deadline
    runtime.shutdown_background();

    Ok(report)
}

fn print_summary(report: &RunReport) {
    println!("═══════════════════════════════════════════════════════════");
    for pattern in &report.patterns {
        match &pattern.outcome {
            PatternOutcome::Completed { pids } => {
                println!("✅ '{}'", pattern.pattern);
                print_pids(pids);
            }
            PatternOutcome::NoProcessFound => {
                println!("❌ '{}': no running process found", pattern.pattern);
            }
            PatternOutcome::Failed { error } => {
                println!("❌ '{}': {}", pattern.pattern, error);
            }
            PatternOutcome::TimedOut { pids } => {
                println!("⏱  '{}': did not finish in time", pattern.pattern);
                print_pids(pids);
            }
        }
    }
    println!("───────────────────────────────────────────────────────────");
    println!("📁 {} thread dump file(s) written", report.files_written());
    println!("═══════════════════════════════════════════════════════════");
}

fn print_pids(pids: &[PidReport]) {
    for pid in pids {
        println!(
            "   PID {:<8} {} written, {} skipped, {} failed",
            pid.pid.as_str(),
            pid.written.len(),
            pid.skipped,
            pid.failed
        );
    }
}
