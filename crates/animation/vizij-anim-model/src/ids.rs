//! Identifiers and simple allocators for model entities.

use serde::{Deserialize, Serialize};

/// Stable identity of a named curve parameter within a skeleton.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct CurveId(pub u32);

/// Index of a bone in skeleton order. Virtual bones follow the real bones.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BoneIndex(pub u32);

impl BoneIndex {
    pub const ROOT: BoneIndex = BoneIndex(0);

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic allocator for CurveId.
/// Ids are never reused, so a removed-then-readded name keeps whatever id the
/// registry already holds for it.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_curve: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_curve(&mut self) -> CurveId {
        let id = CurveId(self.next_curve);
        self.next_curve = self.next_curve.wrapping_add(1);
        id
    }
}
