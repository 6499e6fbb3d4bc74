//! Domain models for JMAP mail entities

mod identity;
mod mailbox;
mod message;
mod state;
mod thread;

pub use identity::{Identity, IdentityId};
pub use mailbox::{Mailbox, MailboxId};
pub use message::{BodyPart, BodyValue, EmailAddress, Header, Message, MessageBuilder, MessageId};
pub use state::{StateChange, StateToken, TypeState, EMAIL_TYPE};
pub use thread::{Thread, ThreadId};

/// Well-known JMAP keywords
pub mod keywords {
    pub const SEEN: &str = "$seen";
    pub const DRAFT: &str = "$draft";
}

/// Serde adapter for JMAP "set" properties such as `mailboxIds` and
/// `keywords`, which travel as `{ "<key>": true }` maps.
pub(crate) mod true_set {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::{BTreeMap, BTreeSet};

    pub fn serialize<S, T>(set: &BTreeSet<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize + Ord,
    {
        let map: BTreeMap<&T, bool> = set.iter().map(|k| (k, true)).collect();
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeSet<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Ord,
    {
        let map: Option<BTreeMap<T, bool>> = Option::deserialize(deserializer)?;
        Ok(map
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| v.then_some(k))
            .collect())
    }
}
