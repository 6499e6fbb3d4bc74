//! Mailbox name -> mailbox lookup

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::jmap::api::{GetResponse, response_for};
use crate::jmap::{Batch, JmapApi, Method};
use crate::models::Mailbox;

/// Resolves mailbox names and remembers the answer, including absence
pub struct MailboxResolver {
    api: Arc<dyn JmapApi>,
    table: RwLock<HashMap<String, Option<Mailbox>>>,
}

impl MailboxResolver {
    pub fn new(api: Arc<dyn JmapApi>) -> Self {
        Self {
            api,
            table: RwLock::new(HashMap::new()),
        }
    }

    /// Find the mailbox with exactly this name
    ///
    /// Returns `Ok(None)` when no mailbox has the name and a configuration
    /// error when several do.
    pub fn resolve(&self, name: &str) -> Result<Option<Mailbox>> {
        if let Some(cached) = self.cached(name) {
            return Ok(cached);
        }
        self.preload(&[name])?;
        Ok(self.cached(name).flatten())
    }

    /// Like `resolve`, but a missing mailbox is a configuration error
    pub fn require(&self, name: &str) -> Result<Mailbox> {
        self.resolve(name)?
            .ok_or_else(|| Error::configuration(format!("No mailbox named \"{name}\" found")))
    }

    /// Resolve every uncached name in a single request
    pub fn preload(&self, names: &[&str]) -> Result<()> {
        let mut pending: Vec<&str> = Vec::new();
        for &name in names {
            if name.is_empty() {
                return Err(Error::configuration("Mailbox name is empty"));
            }
            if self.cached(name).is_none() && !pending.contains(&name) {
                pending.push(name);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        let mut batch = Batch::new();
        let steps: Vec<_> = pending
            .iter()
            .map(|name| {
                let query = batch.push(Method::MailboxQuery {
                    name: name.to_string(),
                });
                batch.push(Method::MailboxGet {
                    ids: query.path("/ids"),
                })
            })
            .collect();

        let responses = self.api.call(&batch)?;

        let mut found = Vec::with_capacity(pending.len());
        for (name, step) in pending.iter().zip(&steps) {
            let response: GetResponse<Mailbox> = response_for(&responses, step)?;
            // The server filter may match substrings; only exact names count
            let mut matches = response.list.into_iter().filter(|m| m.name == *name);
            let mailbox = matches.next();
            if matches.next().is_some() {
                return Err(Error::configuration(format!(
                    "Multiple mailboxes found matching \"{name}\""
                )));
            }
            match &mailbox {
                Some(m) => debug!("Resolved mailbox \"{}\" to {}", name, m.id),
                None => debug!("No mailbox named \"{}\"", name),
            }
            found.push((name.to_string(), mailbox));
        }

        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(found);
        Ok(())
    }

    /// Cached answer for `name`, if it has been looked up
    pub fn cached(&self, name: &str) -> Option<Option<Mailbox>> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Forget the answer for one name
    pub fn invalidate(&self, name: &str) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    pub fn clear(&self) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
