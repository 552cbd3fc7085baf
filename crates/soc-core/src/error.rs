use std::path::PathBuf;

use thiserror::Error;

use crate::bus::MasterId;
use crate::Address;

/// Error classes used to group assembly failures for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Two claims on the address space collide, or a claim is empty.
    Conflict,
    /// A name (region, domain, CSR bank) is reused.
    DuplicateName,
    /// A statically known access decodes to no region.
    UnmappedAddress,
    /// Derived sizes or settings are inconsistent with the board.
    Misconfiguration,
}

/// Region registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum RegionError {
    /// New region overlaps an already registered one.
    #[error(
        "region '{name}' ({base:#010X}..{end:#010X}) overlaps '{existing}' ({existing_base:#010X}..{existing_end:#010X})"
    )]
    Conflict {
        /// Name of the rejected region.
        name: String,
        /// Base of the rejected region.
        base: Address,
        /// Exclusive end of the rejected region.
        end: u64,
        /// Name of the region already holding the range.
        existing: String,
        /// Base of the existing region.
        existing_base: Address,
        /// Exclusive end of the existing region.
        existing_end: u64,
    },
    /// Region has zero length.
    #[error("region '{name}' at {base:#010X} has zero size")]
    EmptyRegion {
        /// Name of the rejected region.
        name: String,
        /// Base of the rejected region.
        base: Address,
    },
    /// Region name is already taken.
    #[error("region name '{name}' is already registered")]
    DuplicateName {
        /// Reused name.
        name: String,
    },
    /// Region extends past the end of the 32-bit address space.
    #[error("region '{name}' ({base:#010X} + {size:#X}) leaves the 32-bit address space")]
    OutOfRange {
        /// Name of the rejected region.
        name: String,
        /// Base of the rejected region.
        base: Address,
        /// Requested size.
        size: u64,
    },
}

/// Bus routing failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum RoutingError {
    /// Address decodes to no registered region.
    #[error("master {master} issued {address:#010X} which decodes to no region")]
    UnmappedAddress {
        /// Issuing master.
        master: MasterId,
        /// Offending address.
        address: Address,
    },
    /// Master id was never registered with the interconnect.
    #[error("master {0} is not attached to the interconnect")]
    UnknownMaster(MasterId),
    /// Region exists but no slave port is bound to it.
    #[error("region '{region}' has no slave bound to it")]
    UnboundRegion {
        /// Region without a slave.
        region: String,
    },
    /// Slave binding references a region that is not in the memory map.
    #[error("cannot bind slave to unknown region '{region}'")]
    UnknownRegion {
        /// Missing region name.
        region: String,
    },
    /// Region already has a slave bound to it.
    #[error("region '{region}' already has a slave bound to it")]
    AlreadyBound {
        /// Region bound twice.
        region: String,
    },
    /// Write issued to a read-only slave window.
    #[error("master {master} wrote {address:#010X} inside read-only region '{region}'")]
    ReadOnly {
        /// Issuing master.
        master: MasterId,
        /// Offending address.
        address: Address,
        /// Read-only region.
        region: String,
    },
    /// Master id space is exhausted.
    #[error("cannot attach master '{name}': all {limit} master ids are taken")]
    TooManyMasters {
        /// Rejected master name.
        name: String,
        /// Number of master ids available.
        limit: usize,
    },
    /// Master name is already attached.
    #[error("master '{name}' is already attached to the interconnect")]
    DuplicateMaster {
        /// Reused master name.
        name: String,
    },
}

/// Boot address resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum BootError {
    /// Gateware, boot image and margin do not fit in the flash device.
    #[error(
        "gateware ({gateware_size:#X}) + boot image ({boot_image_size:#X}) + margin ({safety_margin:#X}) does not fit in {flash_total_size:#X} bytes of flash"
    )]
    Misconfiguration {
        /// Reserved gateware size.
        gateware_size: u64,
        /// Boot image size.
        boot_image_size: u64,
        /// Safety margin at the end of flash.
        safety_margin: u64,
        /// Total flash size.
        flash_total_size: u64,
    },
    /// Flash window extends past the end of the address space.
    #[error("flash window {flash_base:#010X} + {flash_total_size:#X} leaves the 32-bit address space")]
    FlashOutOfRange {
        /// Flash base address.
        flash_base: Address,
        /// Total flash size.
        flash_total_size: u64,
    },
    /// Boot image size is zero.
    #[error("boot image size must be non-zero")]
    EmptyBootImage,
}

/// Clock tree and domain-crossing failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ClockError {
    /// Domain name is reused.
    #[error("clock domain '{0}' is declared twice")]
    DuplicateDomain(String),
    /// Reference to an undeclared domain.
    #[error("clock domain '{0}' is not declared")]
    UnknownDomain(String),
    /// Alias chain loops back on itself.
    #[error("clock domain '{0}' is part of an alias cycle")]
    AliasCycle(String),
    /// Oscillator or PLL output has zero frequency.
    #[error("clock '{name}' resolves to a zero frequency")]
    ZeroFrequency {
        /// Offending clock or domain.
        name: String,
    },
    /// Synchronizer is too shallow to resolve metastability.
    #[error("crossing '{name}' has {stages} synchronizer stage(s); at least {minimum} are required")]
    ShallowSynchronizer {
        /// Crossing name.
        name: String,
        /// Requested stage count.
        stages: u8,
        /// Minimum accepted stage count.
        minimum: u8,
    },
    /// Multi-bit value routed through a single-bit synchronizer.
    #[error("crossing '{name}' is {width} bits wide; only single-bit signals may cross through a synchronizer")]
    MultiBitCrossing {
        /// Crossing name.
        name: String,
        /// Declared width.
        width: u8,
    },
    /// Crossing source and destination are the same domain.
    #[error("crossing '{name}' starts and ends in domain '{domain}'")]
    SameDomainCrossing {
        /// Crossing name.
        name: String,
        /// Domain named on both sides.
        domain: String,
    },
    /// Reset crossing targets a reset-less domain.
    #[error("crossing '{name}' drives the reset of reset-less domain '{domain}'")]
    ResetLessTarget {
        /// Crossing name.
        name: String,
        /// Reset-less domain.
        domain: String,
    },
    /// Crossing name is reused.
    #[error("crossing '{0}' is declared twice")]
    DuplicateCrossing(String),
    /// Asynchronous-reset domain has no synchronizer feeding its reset.
    #[error("domain '{0}' uses an asynchronous reset but no synchronizer drives it")]
    UnsynchronizedReset(String),
    /// Synchronous logic was wired to a domain without reset.
    #[error("component '{component}' needs a reset but domain '{domain}' is reset-less")]
    ResetLessComponent {
        /// Component name.
        component: String,
        /// Reset-less domain.
        domain: String,
    },
    /// POR counter is clocked from a different net than the system domain.
    #[error("power-on reset domain '{por}' is not clocked by the net of system domain '{system}'")]
    PorDomainMismatch {
        /// Power-on reset domain.
        por: String,
        /// System domain.
        system: String,
    },
    /// POR counter does not fit its declared register width.
    #[error("power-on reset delay {cycles} does not fit in a {width}-bit counter")]
    CounterOverflow {
        /// Requested delay.
        cycles: u32,
        /// Counter width in bits.
        width: u8,
    },
}

/// CSR bank allocation failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum CsrError {
    /// Bank name is reused.
    #[error("csr bank '{0}' is allocated twice")]
    DuplicateName(String),
    /// Two bank names share one index in the base table.
    #[error("csr banks '{first}' and '{second}' share index {index}")]
    DuplicateIndex {
        /// First name holding the index.
        first: String,
        /// Second name holding the index.
        second: String,
        /// Shared index.
        index: u8,
    },
    /// Bank index exceeds the CSR window.
    #[error("csr bank '{name}' at index {index} exceeds the {capacity}-bank csr window")]
    WindowExhausted {
        /// Bank name.
        name: String,
        /// Requested index.
        index: u16,
        /// Number of banks available.
        capacity: u16,
    },
}

/// Platform configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    /// I/O error reading the configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration file does not exist.
    #[error("platform file not found: {}", path.display())]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },
    /// Structurally invalid value.
    #[error("invalid platform setting: {detail}")]
    Validation {
        /// Description of the problem.
        detail: String,
    },
}

/// Aggregated failure that aborts a whole assembly pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum AssemblyError {
    /// Region registry rejected a claim.
    #[error("region registry: {0}")]
    Region(#[from] RegionError),
    /// Bus wiring or a static access failed to route.
    #[error("bus interconnect: {0}")]
    Routing(#[from] RoutingError),
    /// Boot constants could not be derived.
    #[error("boot resolver: {0}")]
    Boot(#[from] BootError),
    /// Clock tree or reset wiring is invalid.
    #[error("clock/reset: {0}")]
    Clock(#[from] ClockError),
    /// CSR bank allocation failed.
    #[error("csr map: {0}")]
    Csr(#[from] CsrError),
    /// Peripheral parameters are inconsistent with the board.
    #[error("peripheral '{peripheral}': {detail}")]
    Peripheral {
        /// Peripheral name.
        peripheral: String,
        /// Description of the problem.
        detail: String,
    },
}

impl AssemblyError {
    /// Returns the reporting class for this failure.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Region(RegionError::Conflict { .. } | RegionError::EmptyRegion { .. })
            | Self::Routing(RoutingError::AlreadyBound { .. }) => ErrorClass::Conflict,
            Self::Region(RegionError::DuplicateName { .. })
            | Self::Routing(RoutingError::DuplicateMaster { .. })
            | Self::Clock(ClockError::DuplicateDomain(_) | ClockError::DuplicateCrossing(_))
            | Self::Csr(CsrError::DuplicateName(_) | CsrError::DuplicateIndex { .. }) => {
                ErrorClass::DuplicateName
            }
            Self::Routing(
                RoutingError::UnmappedAddress { .. }
                | RoutingError::UnboundRegion { .. }
                | RoutingError::UnknownRegion { .. },
            ) => ErrorClass::UnmappedAddress,
            Self::Region(RegionError::OutOfRange { .. })
            | Self::Routing(
                RoutingError::UnknownMaster(_)
                | RoutingError::ReadOnly { .. }
                | RoutingError::TooManyMasters { .. },
            )
            | Self::Boot(_)
            | Self::Clock(_)
            | Self::Csr(CsrError::WindowExhausted { .. })
            | Self::Peripheral { .. } => ErrorClass::Misconfiguration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AssemblyError, BootError, ClockError, ErrorClass, RegionError, RoutingError};
    use crate::bus::MasterId;

    #[test]
    fn empty_region_is_reported_as_conflict() {
        let err = AssemblyError::from(RegionError::EmptyRegion {
            name: "rom".into(),
            base: 0,
        });
        assert_eq!(err.class(), ErrorClass::Conflict);
    }

    #[test]
    fn class_mapping_matches_taxonomy() {
        assert_eq!(
            AssemblyError::from(RegionError::DuplicateName { name: "rom".into() }).class(),
            ErrorClass::DuplicateName
        );
        assert_eq!(
            AssemblyError::from(RoutingError::UnmappedAddress {
                master: MasterId::new(0),
                address: 0x1000,
            })
            .class(),
            ErrorClass::UnmappedAddress
        );
        assert_eq!(
            AssemblyError::from(BootError::EmptyBootImage).class(),
            ErrorClass::Misconfiguration
        );
        assert_eq!(
            AssemblyError::from(ClockError::DuplicateDomain("sys".into())).class(),
            ErrorClass::DuplicateName
        );
    }

    #[test]
    fn conflict_message_names_both_regions_and_ranges() {
        let err = RegionError::Conflict {
            name: "user_flash".into(),
            base: 0x2003_0000,
            end: 0x2004_0000,
            existing: "rom".into(),
            existing_base: 0x2002_8000,
            existing_end: 0x2003_8000,
        };
        let message = err.to_string();
        assert!(message.contains("'user_flash'"));
        assert!(message.contains("'rom'"));
        assert!(message.contains("0x20030000"));
        assert!(message.contains("0x20028000"));
    }
}
