//! Elaboration core for the ice40-hx8k SoC: address space, bus wiring, boot
//! layout and clock/reset sequencing.

/// Assembly error taxonomy.
pub mod error;
pub use error::{
    AssemblyError, BootError, ClockError, ConfigError, CsrError, ErrorClass, RegionError,
    RoutingError,
};

/// Region registry and frozen memory map.
pub mod region;
pub use region::{
    Address, MemoryMap, MemoryRegion, RegionKind, RegionRegistry, ADDRESS_SPACE_END,
};

/// Address-decoded bus interconnect and transaction executor.
pub mod bus;
pub use bus::{
    Access, BusError, BusMaster, BusOp, BusResponse, BusSlave, Completion, Interconnect,
    MasterId, MasterKind, SlaveBinding, SlaveError, SlaveHandle, SlaveId, StaticAccess,
    SystemBus, Transaction, MAX_MASTERS,
};

/// Reset vector and user flash derivation.
pub mod boot;
pub use boot::{
    BootConstants, BootParams, BootRegion, GATEWARE_REGION, ROM_REGION, USER_FLASH_REGION,
};

/// Oscillator and clock domain model.
pub mod clock;
pub use clock::{period_ns, ClockDomain, ClockOutput, ClockSource, ClockTree, Oscillator, ResetPolicy};

/// Power-on reset counter and reset synchronizers.
pub mod reset;
pub use reset::{
    CrossingArena, CrossingId, DomainCrossing, PorState, PowerOnReset, ResetSequencer,
    ResetSynchronizer, MIN_SYNC_STAGES, POR_COUNTER_WIDTH, POR_RESET_CYCLES,
};

/// CSR bank numbering.
pub mod csr;
pub use csr::{bank_capacity, CsrBank, CsrMap, CSR_BANK_STRIDE};

/// SPI flash, SDRAM and UART bridge descriptors.
pub mod peripheral;
pub use peripheral::{
    ns_to_cycles, BusSlavePort, ElaborationContext, Peripheral, PeripheralSummary, SdramConfig,
    SdramCycles,
    SdramGeometry, SdramModule, SdramTiming, SlaveWindow, SpiFlashConfig, UartBridgeConfig,
    MAIN_RAM_REGION,
};

/// Board configuration and TOML loading.
pub mod platform;
pub use platform::{
    load_platform_toml, parse_platform_toml, platform_to_toml, validate_platform, BootConfig,
    ClockConfig, CpuConfig, CsrConfig, PlatformConfig, ResetConfig,
};

/// Single-pass SoC assembler.
pub mod soc;
pub use soc::{assemble, Constant, SocDescription, CSR_REGION, EXT_RESET_CROSSING};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
