//! Generational identifiers for lights and driver surfaces

use core::fmt;
use serde::{Deserialize, Serialize};

/// Identifier of a light registered with the lighting context.
///
/// Lower 32 bits hold the slot index, upper 32 bits the generation so a
/// removed light's id never aliases the light that later reuses its slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LightId {
    bits: u64,
}

impl LightId {
    /// Create a new id from index and generation
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            bits: (generation as u64) << 32 | index as u64,
        }
    }

    /// Null id, never handed out by the allocator
    #[inline]
    pub const fn null() -> Self {
        Self { bits: u64::MAX }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.bits == u64::MAX
    }

    /// Slot index
    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits as u32
    }

    /// Generation of the slot when this id was issued
    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.bits >> 32) as u32
    }

    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.bits
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    /// Stable id derived from a light name (FNV-1a).
    ///
    /// Used by tooling that addresses lights by name rather than by slot.
    pub fn from_name(name: &str) -> Self {
        let mut hash = 0xcbf29ce484222325u64;
        for byte in name.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        // Keep clear of the null sentinel
        if hash == u64::MAX {
            hash = hash.wrapping_sub(1);
        }
        Self { bits: hash }
    }
}

impl fmt::Debug for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "LightId(null)")
        } else {
            write!(f, "LightId({}v{})", self.index(), self.generation())
        }
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

impl Default for LightId {
    fn default() -> Self {
        Self::null()
    }
}

/// Slot allocator for [`LightId`]s with generation bumping on free.
#[derive(Debug, Default)]
pub struct LightIdAllocator {
    generations: Vec<u32>,
    free: Vec<u32>,
}

impl LightIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id, reusing a freed slot when one exists
    pub fn allocate(&mut self) -> LightId {
        if let Some(index) = self.free.pop() {
            let generation = self.generations[index as usize];
            return LightId::new(index, generation);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        LightId::new(index, 0)
    }

    /// Free an id. Returns false if the id was already stale.
    pub fn free(&mut self, id: LightId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let slot = &mut self.generations[id.index() as usize];
        *slot = slot.wrapping_add(1);
        self.free.push(id.index());
        true
    }

    /// Check whether an id refers to a live slot
    pub fn is_alive(&self, id: LightId) -> bool {
        if id.is_null() {
            return false;
        }
        match self.generations.get(id.index() as usize) {
            Some(&generation) => {
                generation == id.generation() && !self.free.contains(&id.index())
            }
            None => false,
        }
    }

    /// Number of live ids
    pub fn live_count(&self) -> usize {
        self.generations.len() - self.free.len()
    }
}

/// Opaque handle to a surface created by a render driver
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(pub u64);

impl SurfaceHandle {
    pub const INVALID: SurfaceHandle = SurfaceHandle(0);

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_id_parts() {
        let id = LightId::new(42, 7);
        assert_eq!(id.index(), 42);
        assert_eq!(id.generation(), 7);
        assert_eq!(LightId::from_bits(id.to_bits()), id);
    }

    #[test]
    fn test_light_id_null() {
        assert!(LightId::null().is_null());
        assert!(!LightId::new(0, 0).is_null());
        assert!(LightId::default().is_null());
    }

    #[test]
    fn test_light_id_from_name_is_stable() {
        let a = LightId::from_name("sun");
        let b = LightId::from_name("sun");
        let c = LightId::from_name("lamp");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_null());
    }

    #[test]
    fn test_allocator_reuses_slot_with_new_generation() {
        let mut alloc = LightIdAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(alloc.live_count(), 2);

        assert!(alloc.free(a));
        assert!(!alloc.is_alive(a));
        assert!(!alloc.free(a));

        let c = alloc.allocate();
        assert_eq!(c.index(), a.index());
        assert_eq!(c.generation(), a.generation() + 1);
        assert!(alloc.is_alive(c));
        assert!(alloc.is_alive(b));
    }

    #[test]
    fn test_surface_handle_validity() {
        assert!(!SurfaceHandle::INVALID.is_valid());
        assert!(SurfaceHandle(3).is_valid());
        assert_eq!(SurfaceHandle(3).to_string(), "surface#3");
    }
}
