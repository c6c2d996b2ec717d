use core::fmt;

use crate::ElementType;

// BASE ID
// ================================================================================================

/// Stable handle identifying a [`Base`] across the runtime.
///
/// Ids are assigned by the recorder and are never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BaseId(u64);

impl BaseId {
    /// Returns a new base id wrapping the provided raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer backing this id.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for BaseId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<BaseId> for u64 {
    fn from(id: BaseId) -> Self {
        id.0
    }
}

impl fmt::Display for BaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ALLOCATION STATE
// ================================================================================================

/// Where a base's element data currently lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AllocState {
    /// No storage has been allocated yet; the executor allocates on first write.
    #[default]
    Unallocated,
    /// Data lives in host (main) memory.
    Host,
    /// Data lives in device memory (e.g. a GPU buffer).
    Device,
}

// OWNERSHIP
// ================================================================================================

/// Which layer of the component stack is authoritative for a base's live contents.
///
/// The runtime sits between an upstream caller (the language bridge or an outer runtime layer)
/// and a downstream executor. Lifecycle instructions (`Release`, `Sync`, `Discard`) are rewritten
/// at flush time according to this tag; see the lifecycle manager in `arrayflow-runtime`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Owner {
    /// The caller above this layer holds the live copy.
    #[default]
    Upstream,
    /// This layer's executor holds the live copy.
    Local,
    /// A lower layer holds the live copy.
    Downstream,
}

// BASE
// ================================================================================================

/// Owned, type-tagged flat storage for an array's elements.
///
/// A base holds the actual data (or a handle to device data); it never describes how that data is
/// indexed. Any number of [`View`](crate::View)s may window into the same base, and each live
/// view holds one reference. The lifecycle manager is the sole writer of the reference count and
/// ownership tag once instructions are being recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Base {
    etype: ElementType,
    num_elements: u64,
    state: AllocState,
    refcount: u64,
    owner: Owner,
}

impl Base {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Returns a new unallocated base holding `num_elements` elements of type `etype`.
    ///
    /// The creation reference is counted: a fresh base has a reference count of 1, released by
    /// `free`-ing the base handle.
    pub fn new(etype: ElementType, num_elements: u64) -> Self {
        Self {
            etype,
            num_elements,
            state: AllocState::Unallocated,
            refcount: 1,
            owner: Owner::Upstream,
        }
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the element type of this base.
    pub const fn element_type(&self) -> ElementType {
        self.etype
    }

    /// Returns the total number of elements this base can hold.
    pub const fn num_elements(&self) -> u64 {
        self.num_elements
    }

    /// Returns the total size of this base's storage in bytes.
    pub const fn size_in_bytes(&self) -> u64 {
        self.num_elements * self.etype.byte_width() as u64
    }

    /// Returns the current allocation state.
    pub const fn state(&self) -> AllocState {
        self.state
    }

    /// Returns the current reference count.
    pub const fn refcount(&self) -> u64 {
        self.refcount
    }

    /// Returns the layer currently authoritative for this base's contents.
    pub const fn owner(&self) -> Owner {
        self.owner
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Adds one reference to this base and returns the new count.
    pub fn acquire(&mut self) -> u64 {
        self.refcount += 1;
        self.refcount
    }

    /// Drops one reference from this base and returns the new count.
    ///
    /// Releasing a base whose count is already zero indicates a bookkeeping bug.
    pub fn release(&mut self) -> u64 {
        debug_assert!(self.refcount > 0, "released a base with no live references");
        self.refcount = self.refcount.saturating_sub(1);
        self.refcount
    }

    /// Transfers ownership of this base's live contents to the specified layer.
    pub fn set_owner(&mut self, owner: Owner) {
        self.owner = owner;
    }

    /// Records where this base's data now lives.
    pub fn set_state(&mut self, state: AllocState) {
        self.state = state;
    }
}
