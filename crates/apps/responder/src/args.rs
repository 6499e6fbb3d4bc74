//! Command line parsing

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

pub const USAGE: &str = r#"responder - Reply to new email in a JMAP mailbox

Usage: responder -r <file> [options]

Options:
    -r, --reply-content <file>            File with email reply HTML content (required)
    -m, --mailbox, --folder, --label <name>
                                          Folder or label to examine (default: Inbox)
    -p, --pretend, --dry-run              Print messages to standard output instead of sending email
    -s, --script, --no-events             Run as a script instead of an event-driven service
    -l, --limit, --max-send <count>       Maximum number of email replies to send, 0 for no limit
                                          (only valid with -s/--script) (default: 0)
    -n, --days, --newer-than-days <days>  Only process email received this many days ago or newer
                                          (only valid with -s/--script) (default: 1)
    -d, --debug                           Enable debug logs
    -h, --help                            Show this help message

Credentials: ~/.config/responder/jmap.json or JMAP_HOST / JMAP_API_TOKEN
"#;

/// Options for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub reply_content: PathBuf,
    pub mailbox: String,
    pub dry_run: bool,
    /// Follow the push channel instead of polling once
    pub events: bool,
    pub limit: usize,
    pub newer_than_days: u32,
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(Args),
    Help,
}

/// Parse arguments, excluding the program name
pub fn parse<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut reply_content = None;
    let mut parsed = Args {
        reply_content: PathBuf::new(),
        mailbox: "Inbox".to_string(),
        dry_run: false,
        events: true,
        limit: 0,
        newer_than_days: 1,
        debug: false,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            match inline.clone() {
                Some(v) => Ok(v),
                None => args
                    .next()
                    .with_context(|| format!("{name} requires a value")),
            }
        };

        match flag.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-r" | "--reply-content" => reply_content = Some(PathBuf::from(value(&flag)?)),
            "-m" | "--mailbox" | "--folder" | "--label" => parsed.mailbox = value(&flag)?,
            "-p" | "--pretend" | "--dry-run" => parsed.dry_run = true,
            "-s" | "--script" | "--no-events" => parsed.events = false,
            "-d" | "--debug" => parsed.debug = true,
            "-l" | "--limit" | "--max-send" => {
                let raw = value(&flag)?;
                parsed.limit = raw
                    .parse()
                    .with_context(|| format!("Invalid count for {flag}: {raw}"))?;
            }
            "-n" | "--days" | "--newer-than-days" => {
                let raw = value(&flag)?;
                parsed.newer_than_days = raw
                    .parse()
                    .with_context(|| format!("Invalid number of days for {flag}: {raw}"))?;
            }
            other => bail!("Unknown argument: {other}"),
        }
    }

    parsed.reply_content = reply_content.context("-r/--reply-content is required")?;
    if parsed.mailbox.is_empty() {
        bail!("Mailbox name must not be empty");
    }
    Ok(Command::Run(parsed))
}
