use alloc::{string::String, vec::Vec};

use arrayflow_core::{ExtensionId, View};

use crate::executor::{Batch, Executor, ExecutorError};

// CAPTURING EXECUTOR
// ================================================================================================

/// An executor that records every batch it accepts, for asserting on emission.
#[derive(Default)]
pub struct CapturingExecutor {
    batches: Vec<Batch>,
    fail_next: bool,
    next_extension: u32,
}

impl CapturingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `execute` call fail with an injected error.
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    /// Returns the batches accepted so far.
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Returns the single accepted batch, panicking if there is not exactly one.
    pub fn only_batch(&self) -> &Batch {
        assert_eq!(self.batches.len(), 1, "expected exactly one executed batch");
        &self.batches[0]
    }
}

impl Executor for CapturingExecutor {
    fn execute(&mut self, batch: &Batch) -> Result<(), ExecutorError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(ExecutorError::Failed { reason: "injected failure".into() });
        }
        self.batches.push(batch.clone());
        Ok(())
    }

    fn register_user_function(&mut self, _name: &str) -> Result<ExtensionId, ExecutorError> {
        let id = ExtensionId::new(self.next_extension);
        self.next_extension += 1;
        Ok(id)
    }

    fn message(&mut self, msg: &str) -> String {
        msg.into()
    }

    fn data_get(
        &mut self,
        _view: &View,
        _copy_to_host: bool,
        _force_alloc: bool,
        _nullify: bool,
    ) -> Result<*mut u8, ExecutorError> {
        Ok(core::ptr::null_mut())
    }

    fn data_set(
        &mut self,
        _view: &View,
        _host_ptr: bool,
        _ptr: *mut u8,
    ) -> Result<(), ExecutorError> {
        Ok(())
    }
}
