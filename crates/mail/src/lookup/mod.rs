//! Lookup tables for account-level entities
//!
//! Each resolver owns an explicit, explicitly invalidated table that is
//! filled from the server on first use and shared by `Arc` with the
//! components that need it.

mod identities;
mod mailboxes;

pub use identities::IdentityMatcher;
pub use mailboxes::MailboxResolver;
