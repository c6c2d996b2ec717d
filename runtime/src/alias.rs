use arrayflow_core::View;
use smallvec::SmallVec;

// ALIAS ORACLE
// ================================================================================================

/// Pure predicate over two views answering *overlap?* and *identical?*.
///
/// `overlap` must be sound: it may claim overlap where there is none (conservatism costs only
/// precision), but it must never claim disjointness for views that share an element. Both
/// predicates must be deterministic and symmetric.
pub trait AliasOracle {
    /// Returns true unless the index sets of `a` and `b` are known to be disjoint.
    fn overlap(&self, a: &View, b: &View) -> bool;

    /// Returns true if `a` and `b` select exactly the same index set, expressed identically.
    ///
    /// Two views are identical when they share a base and have equal start, rank, shape, and
    /// stride; rank-0 views are identical whenever base and start match. A dynamic view is never
    /// identical to anything: its descriptor at record time does not describe the elements it
    /// touches at execution time.
    fn identical(&self, a: &View, b: &View) -> bool {
        if a.base() != b.base() || a.is_dynamic() || b.is_dynamic() {
            return false;
        }
        if a.start() != b.start() {
            return false;
        }
        if a.is_scalar() && b.is_scalar() {
            return true;
        }
        a.rank() == b.rank() && a.shape() == b.shape() && a.stride() == b.stride()
    }
}

// CONSERVATIVE ORACLE
// ================================================================================================

/// An oracle that claims overlap whenever two non-empty views share a base.
///
/// Sound by construction; serializes everything on a base.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConservativeOracle;

impl AliasOracle for ConservativeOracle {
    fn overlap(&self, a: &View, b: &View) -> bool {
        a.base() == b.base() && a.num_elements() > 0 && b.num_elements() > 0
    }
}

// PRECISE ORACLE
// ================================================================================================

/// An oracle that proves disjointness where the strided index sets permit it.
///
/// Disjointness is established by bounding-interval separation, by residue-class separation over
/// the gcd of the strides, and by peeling the axis with the largest absolute stride and recursing
/// on the remaining axes when they fit within one block. Anything not provably disjoint is
/// reported as overlapping.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreciseOracle;

impl AliasOracle for PreciseOracle {
    fn overlap(&self, a: &View, b: &View) -> bool {
        if a.base() != b.base() {
            return false;
        }
        if a.num_elements() == 0 || b.num_elements() == 0 {
            return false;
        }
        // A slid view conflicts with everything on its base until a precise model of its
        // per-iteration positions exists.
        if a.is_dynamic() || b.is_dynamic() {
            return true;
        }
        let a = IndexSet::from_view(a);
        let b = IndexSet::from_view(b);
        !proven_disjoint(&a, &b, arrayflow_core::MAX_RANK)
    }
}

// INDEX SET
// ================================================================================================

/// Normalized description of the element offsets a view addresses.
///
/// All strides are made positive by relocating the origin to the lowest addressed offset, axes
/// with a single position (extent 1 or stride 0) are dropped, and the remaining axes are sorted
/// by descending stride.
struct IndexSet {
    lo: i128,
    /// `(extent, stride)` pairs; every extent is at least 2 and every stride at least 1.
    axes: SmallVec<[(u64, u64); 4]>,
}

impl IndexSet {
    fn from_view(view: &View) -> Self {
        let mut lo = view.start() as i128;
        let mut axes: SmallVec<[(u64, u64); 4]> = SmallVec::new();
        for (&extent, &step) in view.shape().iter().zip(view.stride().iter()) {
            if extent <= 1 || step == 0 {
                continue;
            }
            if step < 0 {
                lo += (extent as i128 - 1) * step as i128;
            }
            axes.push((extent, step.unsigned_abs()));
        }
        axes.sort_unstable_by(|x, y| y.1.cmp(&x.1));
        Self { lo, axes }
    }

    /// Returns the distance from the lowest to the highest addressed offset.
    fn span(&self) -> i128 {
        self.axes.iter().map(|&(extent, stride)| (extent as i128 - 1) * stride as i128).sum()
    }

    fn hi(&self) -> i128 {
        self.lo + self.span()
    }

    /// Returns the gcd of all strides; every addressed offset is `lo` plus a multiple of it.
    fn stride_gcd(&self) -> u64 {
        self.axes.iter().fold(0, |acc, &(_, stride)| gcd(acc, stride))
    }

    /// Splits off the leading (largest-stride) axis if its stride equals `stride`.
    fn peel(&self, stride: u64) -> IndexSet {
        let axes = match self.axes.first() {
            Some(&(_, top)) if top == stride => self.axes[1..].into(),
            _ => self.axes.clone(),
        };
        IndexSet { lo: self.lo.rem_euclid(stride as i128), axes }
    }
}

/// Attempts to prove that two normalized index sets share no offset.
///
/// Returning false means "not proven", never "they overlap".
fn proven_disjoint(a: &IndexSet, b: &IndexSet, depth: usize) -> bool {
    if depth == 0 {
        return false;
    }

    // Disjoint bounding intervals.
    if a.hi() < b.lo || b.hi() < a.lo {
        return true;
    }

    // Disjoint residue classes: both sets live on arithmetic lattices, so differing residues
    // modulo the common stride gcd separate them.
    let g = gcd(a.stride_gcd(), b.stride_gcd());
    if g > 1 && (a.lo - b.lo).rem_euclid(g as i128) != 0 {
        return true;
    }

    // Peel the axis with the largest stride: offsets decompose as `lo + i·d + rest`, so if the
    // remaining axes of both sets stay within one block of size `d`, disjointness of the
    // residues modulo `d` proves disjointness of the whole sets.
    let d = match a.axes.first().map(|&(_, s)| s).max(b.axes.first().map(|&(_, s)| s)) {
        Some(d) if d > 1 => d,
        _ => return false,
    };
    let rest_a = a.peel(d);
    let rest_b = b.peel(d);
    if rest_a.hi() < d as i128 && rest_b.hi() < d as i128 {
        return proven_disjoint(&rest_a, &rest_b, depth - 1);
    }

    false
}

// HELPER FUNCTIONS
// ================================================================================================

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

// TESTS
// ================================================================================================
