use ranker::config::SETTINGS;
use ranker::core::commands::Command;
use ranker::core::ranking::RankingService;
use ranker::scheduler::{JobProcess, Scheduler};

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = match &*SETTINGS {
        Ok(settings) => settings.clone(),
        Err(e) => return Err(format!("Could not load settings. {e}").into()),
    };

    // Replies go to stdout, traces to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(settings.get_trace_level())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let schedule = settings.maintenance_schedule.clone();
    let service = Arc::new(RankingService::in_memory(settings));
    let report = service.health().await;
    match report.healthy {
        true => info!("All dependencies ready."),
        false => warn!("Starting with unhealthy dependencies, see !health."),
    }

    let sched = Scheduler::new(service.clone()).await?;
    let jobs = vec![
        JobProcess::PurgeScoreHistory(&schedule),
        JobProcess::EvictExpiredCaches(&schedule),
    ];
    for job in jobs {
        sched.add_job(job).await?;
    }

    info!("Starting scheduler.");
    sched.start().await?;

    info!("Ready, type !help for the list of commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !Command::is_command(line) {
            continue;
        }
        let reply = match Command::build_from(line) {
            Ok(command) => command.execute(&service).await,
            Err(e) => Err(e),
        };
        match reply {
            Ok(text) => println!("{text}"),
            Err(e) => {
                if !e.is_client_error() {
                    error!(command = line, error = %e, "Command failed");
                }
                println!("{}", e.public_message());
            }
        }
    }

    info!("Input closed, shutting down.");
    Ok(())
}
