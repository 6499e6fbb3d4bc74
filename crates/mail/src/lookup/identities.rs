//! Recipient address -> sending identity lookup

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;
use crate::jmap::api::{GetResponse, response_for};
use crate::jmap::{Batch, JmapApi, Method};
use crate::models::{Identity, Message};

struct IdentityTable {
    identities: Vec<Identity>,
    by_email: HashMap<String, usize>,
}

impl IdentityTable {
    fn new(identities: Vec<Identity>) -> Self {
        let mut by_email = HashMap::new();
        for (index, identity) in identities.iter().enumerate() {
            by_email.entry(identity.email.clone()).or_insert(index);
        }
        Self {
            identities,
            by_email,
        }
    }

    fn get(&self, email: &str) -> Option<&Identity> {
        self.by_email.get(email).map(|&i| &self.identities[i])
    }
}

/// Matches messages to the account's sending identities
///
/// Identities are fetched once and kept until `refresh` is called.
pub struct IdentityMatcher {
    api: Arc<dyn JmapApi>,
    table: RwLock<Option<IdentityTable>>,
}

impl IdentityMatcher {
    pub fn new(api: Arc<dyn JmapApi>) -> Self {
        Self {
            api,
            table: RwLock::new(None),
        }
    }

    /// Fetch identities unless they are already loaded
    pub fn load(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }

        let mut batch = Batch::new();
        let step = batch.push(Method::IdentityGet);
        let responses = self.api.call(&batch)?;
        let response: GetResponse<Identity> = response_for(&responses, &step)?;
        debug!("Loaded {} identities", response.list.len());

        *self.table.write().unwrap_or_else(PoisonError::into_inner) =
            Some(IdentityTable::new(response.list));
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn identities(&self) -> Result<Vec<Identity>> {
        Ok(self
            .with_table(|table| Some(table.identities.clone()))?
            .unwrap_or_default())
    }

    /// Identity whose address is exactly `email`
    pub fn by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.with_table(|table| table.get(email).cloned())
    }

    /// Identity matching the first `To` recipient that has one
    ///
    /// Addresses are compared exactly; display names are ignored.
    pub fn match_recipients(&self, message: &Message) -> Result<Option<Identity>> {
        self.with_table(|table| {
            message
                .recipients()
                .iter()
                .find_map(|recipient| table.get(&recipient.email))
                .cloned()
        })
    }

    /// Drop the loaded identities; the next lookup fetches them again
    pub fn refresh(&self) {
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn with_table<T>(&self, f: impl FnOnce(&IdentityTable) -> Option<T>) -> Result<Option<T>> {
        self.load()?;
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Ok(table.as_ref().and_then(f))
    }
}
