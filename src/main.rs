//! Deadair CLI entry point.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use fork::{Fork, daemon};
use log::info;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

mod cli;

use cli::{Cli, Command};
use deadair::broadcast::{BreakdownPrediction, BreakdownRecord, EventKind, StatusReport};
use deadair::config::Config;
use deadair::daemon::{Daemon, DaemonClient, DaemonRequest, DaemonResponse, is_daemon_running};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deadair")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("deadair.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI args first (before any async runtime)
    let cli = Cli::parse();

    // Check if this is a daemon command that needs to fork
    if let Some(Command::Daemon { foreground: false }) = &cli.command {
        // Daemonize BEFORE starting tokio runtime
        let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

        if is_daemon_running(&config.to_daemon_config()) {
            eprintln!("{} Daemon is already running", "!".yellow());
            return Ok(());
        }

        return daemonize(&config);
    }

    // For all other commands, run with tokio
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    match cli.command {
        Some(Command::Daemon { foreground: true }) => {
            // Foreground daemon mode
            if is_daemon_running(&config.to_daemon_config()) {
                eprintln!("{} Daemon is already running", "!".yellow());
                return Ok(());
            }
            println!("{} Putting the studio on air (foreground)...", "→".blue());
            let daemon = Daemon::new(&config)?;
            daemon.run().await?;
            Ok(())
        }
        Some(Command::Daemon { foreground: false }) => {
            // This shouldn't be reached (handled in main), but just in case
            unreachable!("Background daemon should be handled before tokio starts")
        }
        Some(cmd) => run_client_command(&config, cmd).await,
        None => show_status(&config).await,
    }
}

fn daemonize(config: &Config) -> Result<()> {
    // The fork crate's daemon() performs a proper double-fork with
    // setsid, chdir, and stdio redirection. The tokio runtime cannot
    // survive a fork, so it is created afterwards in the grandchild.
    match daemon(false, false) {
        Ok(Fork::Child) => {
            // We are now the daemon process (grandchild after double-fork)

            // Write PID file
            let pid = std::process::id();
            let pid_file = config.pid_path();
            if let Some(parent) = pid_file.parent() {
                fs::create_dir_all(parent).ok();
            }
            if let Ok(mut f) = fs::File::create(&pid_file) {
                writeln!(f, "{}", pid).ok();
            }

            // Setup logging for daemon
            setup_logging().ok();

            // Create tokio runtime and run the daemon
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let daemon = Daemon::new(config)?;
                daemon.run().await?;
                Ok::<(), eyre::Error>(())
            })?;

            Ok(())
        }
        Ok(Fork::Parent(_)) => {
            // Parent process - daemon forked successfully
            println!("{} Studio is on air in the background", "✓".green());
            std::process::exit(0);
        }
        Err(e) => Err(eyre::eyre!("Failed to daemonize: {:?}", e)),
    }
}

async fn run_client_command(config: &Config, command: Command) -> Result<()> {
    let daemon_config = config.to_daemon_config();

    if !is_daemon_running(&daemon_config) {
        eprintln!("{} Studio is off air. Start with: deadair daemon", "!".yellow());
        return Ok(());
    }

    let mut client = DaemonClient::connect(&daemon_config).await?;

    match command {
        Command::Daemon { .. } => unreachable!(),

        Command::Status => {
            let response = client.request(DaemonRequest::Status).await?;
            match response {
                DaemonResponse::Status(status) => print_status(&status),
                DaemonResponse::Error { message } => eprintln!("{} {}", "✗".red(), message),
                _ => {}
            }
        }

        Command::Predict => {
            let response = client.request(DaemonRequest::Predict).await?;
            match response {
                DaemonResponse::Prediction(prediction) => print_prediction(&prediction),
                DaemonResponse::Error { message } => eprintln!("{} {}", "✗".red(), message),
                _ => {}
            }
        }

        Command::History { limit } => {
            let response = client.request(DaemonRequest::History { limit }).await?;
            match response {
                DaemonResponse::History(records) => print_history(&records),
                DaemonResponse::Error { message } => eprintln!("{} {}", "✗".red(), message),
                _ => {}
            }
        }

        Command::Comment { text } => {
            let response = client.request(DaemonRequest::Comment { text }).await?;
            match response {
                DaemonResponse::CommentAck { triggered: true } => {
                    println!("{} Comment landed. A breakdown is starting.", "✓".green());
                }
                DaemonResponse::CommentAck { triggered: false } => {
                    println!("{} Comment received. The desk holds, for now.", "○".yellow());
                }
                DaemonResponse::Error { message } => eprintln!("{} {}", "✗".red(), message),
                _ => {}
            }
        }

        Command::Force => {
            let response = client.request(DaemonRequest::ForceBreakdown).await?;
            match response {
                DaemonResponse::Forced => println!("{} Breakdown forced", "✓".green()),
                DaemonResponse::Error { message } => eprintln!("{} {}", "✗".red(), message),
                _ => {}
            }
        }

        Command::Watch => {
            run_watch_loop(&mut client).await?;
        }

        Command::Stop => {
            let response = client.request(DaemonRequest::Shutdown).await?;
            match response {
                DaemonResponse::Shutdown => println!("{} Studio is off air", "✓".green()),
                DaemonResponse::Error { message } => eprintln!("{} {}", "✗".red(), message),
                _ => {}
            }
        }

        Command::Ping => {
            let response = client.request(DaemonRequest::Ping).await?;
            match response {
                DaemonResponse::Pong => println!("{} Studio is on air", "✓".green()),
                DaemonResponse::Error { message } => eprintln!("{} {}", "✗".red(), message),
                _ => {}
            }
        }
    }

    Ok(())
}

/// Stream live events until Ctrl+C or the daemon goes away.
async fn run_watch_loop(client: &mut DaemonClient) -> Result<()> {
    client.send(&DaemonRequest::Watch).await?;
    println!("{} Watching the broadcast. Press Ctrl+C to stop.", "→".blue());
    println!();

    loop {
        let response = tokio::select! {
            response = client.recv() => response?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{} Stopped watching", "○".yellow());
                break;
            }
        };

        let Some(DaemonResponse::Event(event)) = response else {
            println!();
            println!("{} Feed ended", "○".yellow());
            break;
        };

        let time = event.timestamp.format("%H:%M:%S");
        match event.kind {
            EventKind::BreakdownStarted => {
                let reason = event.payload["reason"].as_str().unwrap_or("?");
                let who = event.persona.as_deref().unwrap_or("?");
                println!("{} [{}] {} is breaking down ({})", "●".red(), time, who.cyan(), reason);
            }
            EventKind::BreakdownStage => {
                let stage = event.payload["stage"].as_str().unwrap_or("?");
                println!("  [{}] stage: {}", time, stage.yellow());
                if let Some(lines) = event.payload["lines"].as_array() {
                    for line in lines {
                        let speaker = line["speaker"].as_str().unwrap_or("?");
                        let text = line["line"].as_str().unwrap_or("");
                        println!("    {}: {}", speaker.cyan(), text);
                    }
                }
            }
            EventKind::BreakdownEnded => {
                let completed = event.payload["completed"].as_bool().unwrap_or(false);
                let icon = if completed { "✓".green() } else { "⊘".yellow() };
                println!("{} [{}] breakdown over (completed: {})", icon, time, completed);
            }
            EventKind::AnchorRotated => {
                let from = event.payload["from"].as_str().unwrap_or("?");
                let to = event.payload["to"].as_str().unwrap_or("?");
                println!("{} [{}] {} hands the desk to {}", "↻".blue(), time, from.cyan(), to.cyan());
            }
            EventKind::ShowChanged => {
                let show = event.payload["show"].as_str().unwrap_or("?");
                println!("{} [{}] now showing: {}", "□".blue(), time, show.bold());
            }
            EventKind::Custom(ref name) => {
                println!("  [{}] {}: {}", time, name, event.payload);
            }
        }
    }

    Ok(())
}

async fn show_status(config: &Config) -> Result<()> {
    let daemon_config = config.to_daemon_config();

    if is_daemon_running(&daemon_config) {
        println!("{} Studio is on air", "✓".green());

        if let Ok(mut client) = DaemonClient::connect(&daemon_config).await
            && let DaemonResponse::Status(status) = client.request(DaemonRequest::Status).await?
        {
            print_status(&status);
        }
    } else {
        println!("{} Studio is off air", "○".yellow());
        println!("Start with: {} daemon", "deadair".cyan());
    }

    Ok(())
}

fn print_status(status: &StatusReport) {
    println!();
    println!("{} Studio Status", "📺".blue());
    println!();
    println!("  On air:     {}", status.on_air.cyan());
    if let Some(show) = &status.show {
        println!("  Show:       {}", show.bold());
    }
    if status.in_breakdown {
        let stage = status.current_stage.map(|s| s.to_string()).unwrap_or_default();
        println!("  Breakdown:  {} ({})", "IN PROGRESS".red().bold(), stage);
    } else {
        println!("  Breakdown:  none (next expected {})", status.next_breakdown_time.format("%H:%M:%S UTC"));
    }
    println!("  Count:      {}", status.breakdown_count);
    println!("  Drift:      {:.1}%", status.drift_probability * 100.0);
    println!("  Uptime:     {}s", status.uptime_secs);
    println!();
    println!("  {}", "Anchors:".bold());
    for persona in &status.personas {
        let sanity = if persona.sanity_level <= 30 {
            persona.sanity_level.to_string().red()
        } else {
            persona.sanity_level.to_string().green()
        };
        println!(
            "    {} sanity={} confusion={} awake={:.1}h{}",
            persona.persona_id.cyan(),
            sanity,
            persona.confusion_level,
            persona.hours_awake,
            if persona.breakdown_imminent { " (imminent)".yellow().to_string() } else { String::new() }
        );
    }
}

fn print_prediction(prediction: &BreakdownPrediction) {
    println!();
    println!("{} Breakdown Forecast", "🔮".blue());
    println!();
    println!("  Predicted:  {}", prediction.predicted_time.format("%H:%M:%S UTC"));
    println!("  In:         {} minutes", prediction.time_until_minutes);
    println!("  Confidence: {}%", prediction.confidence_percent);
    if !prediction.warning_signs.is_empty() {
        println!();
        println!("  {}", "Warning signs:".bold());
        for sign in &prediction.warning_signs {
            println!("    {} {}", "!".yellow(), sign);
        }
    }
}

fn print_history(records: &[BreakdownRecord]) {
    if records.is_empty() {
        println!("{} No breakdowns yet. The desk holds.", "○".yellow());
        return;
    }

    for record in records {
        let icon = if record.completed { "✓".green() } else { "⊘".yellow() };
        println!(
            "{} {} {} {} trigger={} stages={} {:.0}s",
            icon,
            record.started_at.format("%m-%d %H:%M:%S"),
            record.id.dimmed(),
            record.persona_id.cyan(),
            record.trigger,
            record.stage_count,
            record.duration_secs
        );
    }
}
