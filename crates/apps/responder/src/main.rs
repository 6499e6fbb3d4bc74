//! Responder - automatic replies for a JMAP mailbox
//!
//! Replies to every new message in a mailbox that does not have a reply yet,
//! then archives it. Runs either once as a script or as a service following
//! the server's push channel.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;

use mail::{
    DispatchMode, JmapClient, JmapCredentials, MailboxNames, Responder, ResponderSettings,
    RunOptions, RunReport,
};

mod args;

use args::{Args, Command};

fn main() {
    let args = match args::parse(std::env::args().skip(1)) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print!("{}", args::USAGE);
            return;
        }
        Err(e) => {
            eprintln!("Error: {e:#}\n\n{}", args::USAGE);
            std::process::exit(2);
        }
    };

    // Initialize logging
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run(&args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let credentials = match JmapCredentials::load() {
        Ok(creds) => creds,
        Err(e) => {
            if let Some(path) = JmapCredentials::default_credentials_path() {
                warn!(
                    "To configure JMAP access, either:\n\
                     1. Place {{\"host\": ..., \"api_token\": ...}} at: {}\n\
                     2. Or set environment variables: JMAP_HOST and JMAP_API_TOKEN",
                    path.display()
                );
            }
            return Err(e.context("JMAP credentials not found"));
        }
    };
    let settings = ResponderSettings::load().context("Failed to load settings")?;
    let reply_content = config::read_text_file(&args.reply_content)?;

    for warning in startup_warnings(args, &settings) {
        warn!("{}", warning);
    }
    if args.dry_run {
        info!("Dry run: replies are printed, nothing is sent or archived");
    }

    let client = Arc::new(JmapClient::connect(&credentials).context("Failed to connect to JMAP server")?);
    let options = RunOptions {
        mailbox_name: args.mailbox.clone(),
        reply_content,
        newer_than_days: args.newer_than_days,
        max_replies: args.limit,
        mode: DispatchMode::from_dry_run(args.dry_run),
        keep_sent_copy: settings.keep_sent_copy,
    };
    let mut responder = Responder::new(client.clone(), MailboxNames::from(&settings), options);

    let report = if args.events {
        let events = client.event_source().context("Failed to open event source")?;
        responder.process_events(events)?
    } else {
        responder.run_once()?
    };

    summarize(&report);
    Ok(())
}

/// Option combinations that run but probably do not do what was meant
fn startup_warnings(args: &Args, settings: &ResponderSettings) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if args.events && (args.limit > 0 || args.newer_than_days != 1) {
        warnings.push("--limit and --days only apply with -s/--script, ignoring");
    }
    if args.events && !settings.keep_sent_copy {
        // Without a sent copy the original's thread stays at one message,
        // so the archive update can come back as a change and be answered again
        warnings.push(
            "keep_sent_copy is off: replied threads keep a single message and may be answered again",
        );
    }
    warnings
}

fn summarize(report: &RunReport) {
    info!(
        "Replied to {} messages, skipped {}, failed {} ({} ms)",
        report.replied(),
        report.skipped(),
        report.failed(),
        report.duration_ms
    );
    for (id, outcome) in &report.outcomes {
        if let Err(e) = outcome {
            error!("Message {}: {}", id, e);
        }
    }
}
