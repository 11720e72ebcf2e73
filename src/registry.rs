//! Enumerable component snapshotting.
//!
//! Grounded on `examples/original_source/trunk/nes/manager.h` (`CManager`,
//! `ManagerID<>`): the original gives every stateful device a compile-time
//! ID and registers a raw pointer/size pair with a central manager so the
//! whole machine can be serialized as one blob. The template trick doesn't
//! translate into safe Rust (flagged in spec.md's Design Notes), so this
//! keeps the *shape* — a flat registry of `(id, bytes)` pairs — but gets
//! there through a plain trait instead of a compile-time ID template.
//!
//! This only proves the components are enumerable; turning the resulting
//! blobs into a versioned file format is a host concern (spec.md's
//! save-state Non-goal), not this crate's.

use serde::{Deserialize, Serialize};

/// Identifies which component a snapshot blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateId {
    Cpu,
    Ppu,
    Apu,
    Cartridge,
    Controller1,
    Controller2,
    WorkRam,
}

/// A component that can serialize and restore its own state.
///
/// Implemented by `Cpu`, `Ppu`, `Apu`, and `Cartridge` (which delegates to
/// its mapper). Each implementation owns its own byte encoding (a flat
/// `Vec<u8>` of its own fields); the registry never needs to know the shape
/// of any one component's state, only that it round-trips through bytes.
/// The two controller ports and work RAM don't implement this trait (see
/// `Registry::capture_raw`) since they either share a type across two
/// distinct ids or have no type of their own.
pub trait Snapshot {
    fn state_id(&self) -> StateId;
    fn to_bytes(&self) -> Vec<u8>;
    fn load_bytes(&mut self, bytes: &[u8]);
}

/// Collects `(StateId, Vec<u8>)` pairs from every registered component.
///
/// `Nes::snapshot`/`Nes::restore` (in `nes.rs`) are the intended callers;
/// the registry itself holds no component references, it is just the
/// collection step so that adding a new snapshot-able component doesn't
/// require touching call sites that don't care about it.
#[derive(Default)]
pub struct Registry {
    entries: Vec<(StateId, Vec<u8>)>,
}

impl Registry {
    pub fn new() -> Self {
        Registry { entries: Vec::new() }
    }

    /// Snapshot one component into the registry.
    pub fn capture(&mut self, component: &dyn Snapshot) {
        self.entries.push((component.state_id(), component.to_bytes()));
    }

    /// Record a byte blob under `id` directly, bypassing `Snapshot`. For
    /// components that share a type but need distinct ids (the two
    /// controller ports) or that are plain byte arrays with no trait of
    /// their own (work RAM).
    pub fn capture_raw(&mut self, id: StateId, bytes: Vec<u8>) {
        self.entries.push((id, bytes));
    }

    /// Find a captured blob for `id`, if present.
    pub fn find(&self, id: StateId) -> Option<&[u8]> {
        self.entries.iter().find(|(entry_id, _)| *entry_id == id).map(|(_, bytes)| bytes.as_slice())
    }

    pub fn entries(&self) -> &[(StateId, Vec<u8>)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(u32);

    impl Snapshot for Dummy {
        fn state_id(&self) -> StateId {
            StateId::Cpu
        }

        fn to_bytes(&self) -> Vec<u8> {
            self.0.to_le_bytes().to_vec()
        }

        fn load_bytes(&mut self, bytes: &[u8]) {
            self.0 = u32::from_le_bytes(bytes.try_into().unwrap());
        }
    }

    #[test]
    fn captures_and_finds_by_id() {
        let mut reg = Registry::new();
        let dummy = Dummy(0xdead_beef);
        reg.capture(&dummy);
        let bytes = reg.find(StateId::Cpu).expect("captured");
        assert_eq!(bytes, &0xdead_beef_u32.to_le_bytes());
        assert!(reg.find(StateId::Ppu).is_none());
    }
}
