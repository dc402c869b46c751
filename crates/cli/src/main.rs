use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use delve_client::HttpJobService;
use delve_core::ErrorCode;
use delve_observability::LogConfig;
use delve_polling::{CancellationToken, Poller, ProgressUpdate, SessionOptions, TracingReporter};

mod args;

use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    delve_observability::init(
        &LogConfig::default()
            .with_format(args.log_format)
            .with_default_directive("warn"),
    );

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.polling_config()?;
    let service = HttpJobService::from_env().context("failed to configure research client")?;
    let poller = Poller::new(Arc::new(service)).with_config(config);

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling research job");
            on_interrupt.cancel();
        }
    });

    let mut options = SessionOptions::new()
        .with_cancellation(token)
        .with_reporter(Arc::new(TracingReporter));
    if !args.quiet {
        options = options.on_progress(print_progress);
    }

    let outcome = match args.resume.clone() {
        Some(job_id) => poller.resume(job_id, options).await,
        None => poller.research(&args.request(), options).await,
    };

    match outcome {
        Ok(result) => {
            println!("{}", result.text);
            Ok(())
        }
        Err(err) => {
            // The remote job may still be running after these.
            let resumable = matches!(
                err.code,
                ErrorCode::Network | ErrorCode::PollingTimeout | ErrorCode::Cancelled
            );
            if let (true, Some(job_id)) = (resumable, &err.job_id) {
                eprintln!("job {job_id} can be resumed with --resume {job_id}");
            }
            Err(err.into())
        }
    }
}

fn print_progress(update: &ProgressUpdate) -> anyhow::Result<()> {
    let seconds = update.elapsed_time_ms as f64 / 1000.0;
    let detail = match &update.progress {
        Some(p) => match p.percentage {
            Some(pct) => format!(" {} ({pct:.0}%)", p.step),
            None => format!(" {}", p.step),
        },
        None => String::new(),
    };
    eprintln!(
        "[{seconds:>7.1}s] poll #{} {}{detail}",
        update.poll_count, update.status
    );
    Ok(())
}
