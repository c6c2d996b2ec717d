use crate::errors::OptionsError;

// CONSTANTS
// ================================================================================================

/// Default number of freed base allocations the executor retains for reuse.
const DEFAULT_VCACHE_SIZE: usize = 10;

// RUNTIME OPTIONS
// ================================================================================================

/// Recorder configuration.
///
/// - `vcache_size` bounds the executor's cache of freed base allocations kept for reuse; the
///   recorder only forwards it, allocation caching itself lives in the executor.
/// - `batch_size` is the flush threshold in recorded instructions; 0 means the recorder flushes
///   only on an explicit call (or when a data access forces materialization).
/// - `debug_graph_path` dumps the last built flow graph in textual form on each flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeOptions {
    vcache_size: usize,
    batch_size: usize,
    #[cfg(feature = "std")]
    debug_graph_path: Option<std::path::PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            vcache_size: DEFAULT_VCACHE_SIZE,
            batch_size: 0,
            #[cfg(feature = "std")]
            debug_graph_path: None,
        }
    }
}

impl RuntimeOptions {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Returns new runtime options.
    ///
    /// # Errors
    /// Returns an error if `vcache_size` is zero.
    pub fn new(vcache_size: usize, batch_size: usize) -> Result<Self, OptionsError> {
        if vcache_size == 0 {
            return Err(OptionsError::InvalidVcacheSize);
        }
        Ok(Self {
            vcache_size,
            batch_size,
            #[cfg(feature = "std")]
            debug_graph_path: None,
        })
    }

    /// Sets the path the flow graph is dumped to on each flush.
    #[cfg(feature = "std")]
    pub fn with_debug_graph_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.debug_graph_path = Some(path.into());
        self
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the maximum number of freed base allocations retained for reuse.
    pub const fn vcache_size(&self) -> usize {
        self.vcache_size
    }

    /// Returns the flush threshold in instructions; 0 disables threshold flushing.
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the flow-graph dump path, if configured.
    #[cfg(feature = "std")]
    pub fn debug_graph_path(&self) -> Option<&std::path::Path> {
        self.debug_graph_path.as_deref()
    }
}

// TESTS
// ================================================================================================
