//! Per-field resolution claims.

use crate::resource::FieldKey;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::thread::{self, ThreadId};

/// Fields whose resolver is currently running, and on which thread.
///
/// A second thread asking for a claimed field blocks until the owner
/// releases it, then re-reads the cache instead of running the resolver
/// again.
#[derive(Default)]
pub(crate) struct InFlight {
    owners: Mutex<HashMap<FieldKey, ThreadId>>,
    released: Condvar,
}

/// Held while a resolver runs. Dropping it wakes waiting threads.
pub(crate) struct Claim<'a> {
    table: &'a InFlight,
    key: FieldKey,
}

impl InFlight {
    /// Claim `key` for the current thread, waiting while another thread
    /// holds it. Returns `None` when the current thread already holds it.
    pub fn claim(&self, key: FieldKey) -> Option<Claim<'_>> {
        let me = thread::current().id();
        let mut owners = self.owners.lock();
        loop {
            match owners.get(&key).copied() {
                None => {
                    owners.insert(key.clone(), me);
                    return Some(Claim { table: self, key });
                }
                Some(owner) if owner == me => return None,
                Some(_) => self.released.wait(&mut owners),
            }
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.table.owners.lock().remove(&self.key);
        self.table.released.notify_all();
    }
}
