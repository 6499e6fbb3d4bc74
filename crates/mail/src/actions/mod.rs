//! Mutating actions
//!
//! Sending a reply and archiving the original. Both honour a dry-run mode
//! in which the would-be request is printed and nothing is submitted.

mod archive;
mod reply;

pub use archive::{Archiver, archive_patch};
pub use reply::{ReplyDispatcher, make_message_id};

use crate::config::ResponderSettings;

/// Whether mutations are submitted or only printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    Live,
    #[default]
    DryRun,
}

impl DispatchMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Live }
    }

    pub fn is_live(self) -> bool {
        self == Self::Live
    }
}

/// Names of the well-known mailboxes the actions work with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxNames {
    pub inbox: String,
    pub drafts: String,
    pub sent: String,
}

impl Default for MailboxNames {
    fn default() -> Self {
        Self::from(&ResponderSettings::default())
    }
}

impl From<&ResponderSettings> for MailboxNames {
    fn from(settings: &ResponderSettings) -> Self {
        Self {
            inbox: settings.inbox_name.clone(),
            drafts: settings.drafts_name.clone(),
            sent: settings.sent_name.clone(),
        }
    }
}

/// Print a request that dry-run mode is not submitting
pub(crate) fn print_dry_run(rendered: &str) {
    println!("{rendered}");
}
