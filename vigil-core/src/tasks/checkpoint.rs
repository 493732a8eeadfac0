//! Saves the model into a [`CheckpointStore`] when it fires.

use crate::checkpoint::CheckpointStore;
use crate::context::MonitorContext;
use crate::error::TaskError;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct CheckpointTask {
    store: CheckpointStore,
    last_saved: Option<u64>,
}

impl CheckpointTask {
    pub fn new(store: CheckpointStore) -> Self {
        Self {
            store,
            last_saved: None,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn last_saved(&self) -> Option<u64> {
        self.last_saved
    }
}

impl Task for CheckpointTask {
    fn run(&mut self, ctx: &MonitorContext<'_>) -> Result<(), TaskError> {
        // An exit run right after a periodic save at the same step has nothing new.
        if self.last_saved == Some(ctx.step) {
            return Ok(());
        }
        self.store.save(ctx.step, ctx.model)?;
        self.last_saved = Some(ctx.step);
        Ok(())
    }
}
