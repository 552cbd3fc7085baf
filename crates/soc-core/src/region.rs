//! Region registry: write-once claims on the 32-bit address space.
//!
//! Regions are claimed during assembly through [`RegionRegistry::register`].
//! Once every claim is in, [`RegionRegistry::freeze`] hands out an immutable
//! [`MemoryMap`]; bus wiring only ever sees the frozen map.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::RegionError;

/// Bus address on the SoC fabric.
pub type Address = u32;

/// Exclusive upper bound of the 32-bit address space.
pub const ADDRESS_SPACE_END: u64 = 1 << 32;

/// Backing-store classification attached to every region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionKind {
    /// Cached memory that firmware links against (boot ROM alias, user flash).
    CachedLinker,
    /// Uncached memory-mapped peripheral registers.
    Peripheral,
    /// External storage behind a controller (SDRAM, raw flash contents).
    ExternalStorage,
}

impl RegionKind {
    /// Returns the type tag used in published artifacts.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CachedLinker => "cached+linker",
            Self::Peripheral => "io",
            Self::ExternalStorage => "cached",
        }
    }

    /// Returns `true` when firmware may place sections in this region.
    #[must_use]
    pub const fn is_linkable(self) -> bool {
        matches!(self, Self::CachedLinker | Self::ExternalStorage)
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One claimed half-open address range `[base, base + size)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryRegion {
    /// Unique region name.
    pub name: String,
    /// Inclusive start address.
    pub base: Address,
    /// Length in bytes, always non-zero.
    pub size: u32,
    /// Backing-store classification.
    pub kind: RegionKind,
}

impl MemoryRegion {
    /// Exclusive end address, widened so a region may end exactly at 4 GiB.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    /// Returns `true` when `addr` falls inside this region.
    #[must_use]
    pub const fn contains(&self, addr: Address) -> bool {
        addr >= self.base && (addr as u64) < self.end()
    }

    /// Half-open interval overlap test.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        (self.base as u64) < other.end() && (other.base as u64) < self.end()
    }

    /// Byte offset of `addr` from the region base, if contained.
    #[must_use]
    pub const fn offset_of(&self, addr: Address) -> Option<u32> {
        if self.contains(addr) {
            Some(addr - self.base)
        } else {
            None
        }
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} {:#010x}..{:#010x} ({:#x} bytes, {})",
            self.name,
            self.base,
            self.end(),
            self.size,
            self.kind
        )
    }
}

/// Mutable registry used during the single assembly pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionRegistry {
    regions: Vec<MemoryRegion>,
}

impl RegionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Claims `[base, base + size)` under `name`.
    ///
    /// # Errors
    ///
    /// - [`RegionError::DuplicateName`] when `name` is already claimed.
    /// - [`RegionError::EmptyRegion`] when `size == 0`.
    /// - [`RegionError::OutOfRange`] when the range passes 4 GiB.
    /// - [`RegionError::Conflict`] when the range overlaps an existing claim.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        base: Address,
        size: u32,
        kind: RegionKind,
    ) -> Result<&MemoryRegion, RegionError> {
        let name = name.into();

        if self.get(&name).is_some() {
            return Err(RegionError::DuplicateName { name });
        }
        if size == 0 {
            return Err(RegionError::EmptyRegion { name, base });
        }
        if u64::from(base) + u64::from(size) > ADDRESS_SPACE_END {
            return Err(RegionError::OutOfRange {
                name,
                base,
                size: u64::from(size),
            });
        }

        let candidate = MemoryRegion {
            name,
            base,
            size,
            kind,
        };

        if let Some(existing) = self.regions.iter().find(|r| r.overlaps(&candidate)) {
            return Err(RegionError::Conflict {
                end: candidate.end(),
                name: candidate.name,
                base: candidate.base,
                existing: existing.name.clone(),
                existing_base: existing.base,
                existing_end: existing.end(),
            });
        }

        debug!("claimed {candidate}");
        let index = self.regions.partition_point(|r| r.base < candidate.base);
        self.regions.insert(index, candidate);
        Ok(&self.regions[index])
    }

    /// Returns the region containing `addr`.
    #[must_use]
    pub fn resolve(&self, addr: Address) -> Option<&MemoryRegion> {
        resolve_sorted(&self.regions, addr)
    }

    /// Looks a region up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Number of claimed regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` when nothing has been claimed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Iterates claims in ascending base order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    /// Ends the claim phase and returns the read-only memory map.
    #[must_use]
    pub fn freeze(self) -> MemoryMap {
        MemoryMap {
            regions: self.regions,
        }
    }
}

/// Frozen, ordered memory map published after assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
}

impl MemoryMap {
    /// Returns the region containing `addr`.
    #[must_use]
    pub fn resolve(&self, addr: Address) -> Option<&MemoryRegion> {
        resolve_sorted(&self.regions, addr)
    }

    /// Looks a region up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Index of a region by name, stable for the lifetime of the map.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.name == name)
    }

    /// Index of the region containing `addr`.
    #[must_use]
    pub fn index_containing(&self, addr: Address) -> Option<usize> {
        let index = self.regions.partition_point(|r| r.base <= addr);
        index
            .checked_sub(1)
            .filter(|&i| self.regions[i].contains(addr))
    }

    /// Region at `index`.
    #[must_use]
    pub fn region(&self, index: usize) -> Option<&MemoryRegion> {
        self.regions.get(index)
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` when the map holds no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Iterates regions in ascending base order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    /// Regions as an ordered slice.
    #[must_use]
    pub fn as_slice(&self) -> &[MemoryRegion] {
        &self.regions
    }
}

fn resolve_sorted(regions: &[MemoryRegion], addr: Address) -> Option<&MemoryRegion> {
    let index = regions.partition_point(|r| r.base <= addr);
    index
        .checked_sub(1)
        .map(|i| &regions[i])
        .filter(|r| r.contains(addr))
}

#[cfg(test)]
mod tests {
    use super::{MemoryRegion, RegionKind, RegionRegistry};
    use crate::error::RegionError;

    fn board_registry() -> RegionRegistry {
        let mut registry = RegionRegistry::new();
        registry
            .register("gateware", 0x2000_0000, 0x2_8000, RegionKind::ExternalStorage)
            .expect("gateware");
        registry
            .register("rom", 0x2002_8000, 0x8000, RegionKind::CachedLinker)
            .expect("rom");
        registry
            .register("main_ram", 0x4000_0000, 0x200_0000, RegionKind::ExternalStorage)
            .expect("main_ram");
        registry
            .register("csr", 0x6000_0000, 0x1_0000, RegionKind::Peripheral)
            .expect("csr");
        registry
    }

    #[test]
    fn resolve_is_correct_at_boundaries() {
        let registry = board_registry();

        assert_eq!(registry.resolve(0x2000_0000).map(|r| r.name.as_str()), Some("gateware"));
        assert_eq!(registry.resolve(0x2002_7FFF).map(|r| r.name.as_str()), Some("gateware"));
        assert_eq!(registry.resolve(0x2002_8000).map(|r| r.name.as_str()), Some("rom"));
        assert_eq!(registry.resolve(0x2002_FFFF).map(|r| r.name.as_str()), Some("rom"));
        assert_eq!(registry.resolve(0x2003_0000), None);
        assert_eq!(registry.resolve(0x1FFF_FFFF), None);
        assert_eq!(registry.resolve(0x0000_0000), None);
        assert_eq!(registry.resolve(0x6000_FFFF).map(|r| r.name.as_str()), Some("csr"));
        assert_eq!(registry.resolve(0x6001_0000), None);
    }

    #[test]
    fn adjacent_regions_do_not_conflict() {
        let mut registry = RegionRegistry::new();
        registry
            .register("a", 0x1000, 0x1000, RegionKind::Peripheral)
            .expect("first");
        registry
            .register("b", 0x2000, 0x1000, RegionKind::Peripheral)
            .expect("adjacent above");
        registry
            .register("c", 0x0, 0x1000, RegionKind::Peripheral)
            .expect("adjacent below");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn overlapping_claim_reports_both_regions() {
        let mut registry = board_registry();
        let err = registry
            .register("user_flash", 0x2002_F000, 0x1000, RegionKind::CachedLinker)
            .expect_err("overlaps rom");

        assert_eq!(
            err,
            RegionError::Conflict {
                name: "user_flash".into(),
                base: 0x2002_F000,
                end: 0x2003_0000,
                existing: "rom".into(),
                existing_base: 0x2002_8000,
                existing_end: 0x2003_0000,
            }
        );
    }

    #[test]
    fn enclosing_claim_is_rejected() {
        let mut registry = board_registry();
        let err = registry
            .register("spiflash", 0x2000_0000, 0x40_0000, RegionKind::ExternalStorage)
            .expect_err("encloses gateware and rom");
        assert!(matches!(err, RegionError::Conflict { .. }));
    }

    #[test]
    fn zero_size_and_duplicate_names_are_rejected() {
        let mut registry = board_registry();
        assert_eq!(
            registry.register("empty", 0x7000_0000, 0, RegionKind::Peripheral),
            Err(RegionError::EmptyRegion {
                name: "empty".into(),
                base: 0x7000_0000,
            })
        );
        assert_eq!(
            registry.register("rom", 0x7000_0000, 0x10, RegionKind::Peripheral),
            Err(RegionError::DuplicateName { name: "rom".into() })
        );
    }

    #[test]
    fn region_may_end_exactly_at_top_of_address_space() {
        let mut registry = RegionRegistry::new();
        let region = registry
            .register("top", 0xFFFF_F000, 0x1000, RegionKind::Peripheral)
            .expect("ends at 4 GiB");
        assert_eq!(region.end(), 1 << 32);
        assert!(registry.resolve(u32::MAX).is_some());

        let err = registry
            .register("past", 0xFFFF_FFFF, 2, RegionKind::Peripheral)
            .expect_err("passes 4 GiB");
        assert!(matches!(err, RegionError::OutOfRange { .. }));
    }

    #[test]
    fn frozen_map_preserves_ascending_order() {
        let mut registry = RegionRegistry::new();
        registry.register("c", 0x3000, 0x10, RegionKind::Peripheral).expect("c");
        registry.register("a", 0x1000, 0x10, RegionKind::Peripheral).expect("a");
        registry.register("b", 0x2000, 0x10, RegionKind::Peripheral).expect("b");

        let map = registry.freeze();
        let names: Vec<_> = map.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(map.index_of("b"), Some(1));
        assert_eq!(map.index_containing(0x200F), Some(1));
        assert_eq!(map.index_containing(0x2010), None);
    }

    #[test]
    fn offset_of_is_relative_to_base() {
        let region = MemoryRegion {
            name: "rom".into(),
            base: 0x2002_8000,
            size: 0x8000,
            kind: RegionKind::CachedLinker,
        };
        assert_eq!(region.offset_of(0x2002_8004), Some(4));
        assert_eq!(region.offset_of(0x2003_0000), None);
    }

    #[test]
    fn kind_tags_match_artifact_format() {
        assert_eq!(RegionKind::CachedLinker.as_str(), "cached+linker");
        assert_eq!(RegionKind::Peripheral.as_str(), "io");
        assert_eq!(RegionKind::ExternalStorage.as_str(), "cached");
        assert!(!RegionKind::Peripheral.is_linkable());
    }
}
