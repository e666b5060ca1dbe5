//! Queue of deferred batch gathers.

use crate::error::Result;
use crate::resource::FieldRef;
use crate::runtime::Runtime;
use parking_lot::Mutex;

/// A batch fetch that fills every pending field it was queued for
pub(crate) type GatherFn = Box<dyn FnOnce(&Runtime, &[FieldRef]) -> Result<()> + Send>;

pub(crate) struct Gather {
    pub key: String,
    pub pending: Vec<FieldRef>,
    pub run: GatherFn,
}

#[derive(Default)]
pub(crate) struct GatherQueue {
    queue: Mutex<Vec<Gather>>,
}

impl GatherQueue {
    /// Queue `pending` under `key`. Fields deferred under a key that is
    /// already queued join that gather and `run` is dropped.
    pub fn enqueue(&self, key: &str, pending: FieldRef, run: GatherFn) -> bool {
        let mut queue = self.queue.lock();
        if let Some(gather) = queue.iter_mut().find(|g| g.key == key) {
            if !gather.pending.iter().any(|p| p.key() == pending.key()) {
                gather.pending.push(pending);
            }
            return false;
        }
        queue.push(Gather {
            key: key.to_string(),
            pending: vec![pending],
            run,
        });
        true
    }

    pub fn take(&self) -> Vec<Gather> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
}
