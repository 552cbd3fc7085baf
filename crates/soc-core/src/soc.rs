//! Single-pass SoC elaboration.
//!
//! [`assemble`] runs the clock tree, boot resolver, region registry, bus
//! interconnect and CSR allocator in a fixed order and returns the published
//! [`SocDescription`]. The first failure aborts the pass.

use log::{debug, info};
use serde::Serialize;

use crate::boot::{BootConstants, BootParams};
use crate::bus::{Access, BusOp, Interconnect, MasterId, MasterKind, SlaveId, StaticAccess};
use crate::clock::{period_ns, ClockTree};
use crate::csr::{bank_capacity, CsrMap};
use crate::error::{AssemblyError, ClockError};
use crate::peripheral::{BusSlavePort, ElaborationContext, Peripheral, PeripheralSummary};
use crate::platform::{PlatformConfig, ResetConfig};
use crate::region::{Address, MemoryMap, RegionKind, RegionRegistry};
use crate::reset::{
    CrossingArena, DomainCrossing, PowerOnReset, ResetSequencer, ResetSynchronizer,
};

/// Name of the CSR window region and of its slave port.
pub const CSR_REGION: &str = "csr";

/// Name of the board-level external reset crossing.
pub const EXT_RESET_CROSSING: &str = "ext_reset";

/// Constant exported to firmware headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Constant {
    /// Symbol name.
    pub name: String,
    /// Value.
    pub value: u64,
}

/// Published result of an assembly pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocDescription {
    /// FPGA device name.
    pub device: String,
    /// Routing table, including the frozen memory map.
    pub interconnect: Interconnect,
    /// Slave port names, indexed by [`SlaveId`].
    pub slaves: Vec<String>,
    /// Instantiated peripherals in elaboration order.
    pub peripherals: Vec<PeripheralSummary>,
    /// Derived boot layout.
    pub boot: BootConstants,
    /// Firmware constants in publication order.
    pub constants: Vec<Constant>,
    /// CSR bank assignment.
    pub csr: CsrMap,
    /// Bus address of the CSR window.
    pub csr_base: Address,
    /// Validated clock tree.
    pub clock_tree: ClockTree,
    /// Declared reset crossings.
    pub crossings: CrossingArena,
    /// Domain the bus and peripherals run in.
    pub system_domain: String,
    /// Domain holding the POR counter.
    pub por_domain: String,
    /// Reset generation settings.
    pub reset: ResetConfig,
    /// System clock frequency in hertz.
    pub sys_clk_hz: u32,
    /// Timing constraint on the oscillator, in nanoseconds.
    pub period_ns: f64,
}

impl SocDescription {
    /// Ordered memory map.
    #[must_use]
    pub const fn memory_map(&self) -> &MemoryMap {
        self.interconnect.map()
    }

    /// Looks a published constant up by name.
    #[must_use]
    pub fn constant(&self, name: &str) -> Option<u64> {
        self.constants
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value)
    }

    /// Builds a fresh reset sequencer in its power-on state.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::CounterOverflow`] when the POR delay does not fit
    /// its counter; assembly already rejects such configurations.
    pub fn reset_sequencer(&self) -> Result<ResetSequencer, ClockError> {
        let por = PowerOnReset::new(self.reset.por_cycles, self.reset.counter_width)?;
        let crossing = self
            .crossings
            .driving(&self.por_domain)
            .and_then(|id| self.crossings.get(id));
        Ok(crossing.map_or_else(
            || ResetSequencer::power_on_only(por),
            |crossing| {
                ResetSequencer::with_external_reset(por, ResetSynchronizer::for_crossing(crossing))
            },
        ))
    }
}

/// Elaborates a platform into a [`SocDescription`].
///
/// The same configuration always yields the same description.
///
/// # Errors
///
/// Returns the first [`AssemblyError`] hit by any stage.
pub fn assemble(platform: &PlatformConfig) -> Result<SocDescription, AssemblyError> {
    info!("assembling {} ({})", platform.device, platform.toolchain);

    let clock = &platform.clock;
    let clock_tree = ClockTree::new(
        clock.oscillator.clone(),
        clock.domains.clone(),
        clock.outputs.clone(),
    )?;
    let sys_clk_hz = clock_tree.frequency_hz(&clock.system_domain)?;
    clock_tree.check_por_net(&clock.por_domain, &clock.system_domain)?;

    let crossings = declare_crossings(platform, &clock_tree)?;
    PowerOnReset::new(platform.reset.por_cycles, platform.reset.counter_width)?;

    let boot = BootParams {
        flash_base: platform.spiflash.base,
        gateware_size: platform.gateware_size,
        boot_image_size: platform.boot.boot_image_size,
        flash_total_size: platform.spiflash.total_size,
        safety_margin: platform.boot.safety_margin,
    }
    .resolve()?;
    debug!(
        "reset vector {:#010x}, user flash {:#010x}+{:#x}",
        boot.reset_vector, boot.user_region_base, boot.user_region_size
    );

    let peripherals = [
        Peripheral::SpiFlash(platform.spiflash.clone()),
        Peripheral::Sdram(platform.sdram.clone()),
        Peripheral::UartBridge(platform.uart_bridge),
    ];
    let ctx = ElaborationContext {
        boot: &boot,
        sys_clk_hz,
    };

    let (interconnect, slaves) = wire_bus(platform, &peripherals, &ctx)?;

    let extra: Vec<String> = peripherals
        .iter()
        .flat_map(Peripheral::csr_banks)
        .map(|name| (*name).to_owned())
        .chain(platform.csr.extra_banks.iter().cloned())
        .collect();
    let csr = CsrMap::allocate(
        &platform.csr.base_map,
        &extra,
        bank_capacity(platform.csr.size),
    )?;

    let system = clock_tree.domain(&clock.system_domain)?;
    for peripheral in &peripherals {
        if !system.reset_policy.has_reset() {
            return Err(ClockError::ResetLessComponent {
                component: peripheral.name().to_owned(),
                domain: system.name.clone(),
            }
            .into());
        }
        debug!("{} clocked by '{}'", peripheral.name(), system.name);
    }

    let constants = publish_constants(platform, &peripherals, &ctx)?;

    let description = SocDescription {
        device: platform.device.clone(),
        slaves,
        peripherals: peripherals.iter().map(Peripheral::summary).collect(),
        boot,
        constants,
        csr,
        csr_base: platform.csr.base,
        period_ns: period_ns(clock_tree.oscillator().frequency_hz),
        clock_tree,
        crossings,
        system_domain: clock.system_domain.clone(),
        por_domain: clock.por_domain.clone(),
        reset: platform.reset,
        sys_clk_hz,
        interconnect,
    };
    info!(
        "assembled {} regions, {} masters, {} csr banks",
        description.memory_map().len(),
        description.interconnect.masters().len(),
        description.csr.len()
    );
    Ok(description)
}

/// Claims every slave window, freezes the map and binds ports and masters.
fn wire_bus(
    platform: &PlatformConfig,
    peripherals: &[Peripheral],
    ctx: &ElaborationContext<'_>,
) -> Result<(Interconnect, Vec<String>), AssemblyError> {
    let mut registry = RegionRegistry::new();
    let mut slaves = Vec::new();
    let mut ports = Vec::new();
    for peripheral in peripherals {
        let windows = peripheral.windows(ctx)?;
        if windows.is_empty() {
            continue;
        }
        let slave = SlaveId::new(slaves.len());
        slaves.push(peripheral.name().to_owned());
        for window in windows {
            registry.register(window.region.as_str(), window.base, window.size, window.kind)?;
            ports.push((window.region, slave, window.slave_offset, window.access));
        }
    }
    let csr_slave = SlaveId::new(slaves.len());
    slaves.push(CSR_REGION.to_owned());
    registry.register(CSR_REGION, platform.csr.base, platform.csr.size, RegionKind::Peripheral)?;
    ports.push((CSR_REGION.to_owned(), csr_slave, 0, Access::ReadWrite));

    let mut interconnect = Interconnect::new(registry.freeze());
    for (region, slave, offset, access) in &ports {
        interconnect.attach_slave(region, *slave, *offset, *access)?;
    }
    for peripheral in peripherals {
        if let Some(kind) = peripheral.master_kind() {
            interconnect.add_master(peripheral.name(), kind)?;
        }
    }
    if let Some(cpu) = &platform.cpu {
        interconnect.add_master(cpu.name.as_str(), MasterKind::Fetch)?;
    }
    interconnect.check_bindings()?;
    interconnect.check_static_accesses(&static_accesses(
        &interconnect,
        ctx.boot,
        platform.csr.base,
    ))?;
    Ok((interconnect, slaves))
}

fn publish_constants(
    platform: &PlatformConfig,
    peripherals: &[Peripheral],
    ctx: &ElaborationContext<'_>,
) -> Result<Vec<Constant>, AssemblyError> {
    let mut constants = vec![
        constant("CONFIG_CPU_RESET_ADDR", ctx.boot.reset_vector),
        constant("FLASH_BOOT_ADDRESS", ctx.boot.flash_boot_address()),
    ];
    for peripheral in peripherals {
        constants.extend(
            peripheral
                .constants(ctx)?
                .into_iter()
                .map(|(name, value)| Constant { name, value }),
        );
    }
    if platform.boot.rom_disable {
        constants.push(constant("ROM_DISABLE", 1_u8));
    }
    constants.push(constant("CONFIG_CLOCK_FREQUENCY", ctx.sys_clk_hz));
    Ok(constants)
}

fn declare_crossings(
    platform: &PlatformConfig,
    tree: &ClockTree,
) -> Result<CrossingArena, ClockError> {
    let mut arena = CrossingArena::new();
    if platform.reset.external_reset {
        arena.declare(
            tree,
            DomainCrossing {
                name: EXT_RESET_CROSSING.into(),
                from: None,
                to: platform.clock.por_domain.clone(),
                stages: platform.reset.synchronizer_stages,
            },
            1,
        )?;
    }
    arena.check_coverage(tree)?;
    Ok(arena)
}

/// Accesses every attached master is known to make once out of reset.
fn static_accesses(
    interconnect: &Interconnect,
    boot: &BootConstants,
    csr_base: Address,
) -> Vec<StaticAccess> {
    let mut accesses = Vec::new();
    for (index, master) in interconnect.masters().iter().enumerate() {
        let Ok(raw) = u8::try_from(index) else {
            break;
        };
        let id = MasterId::new(raw);
        let mut push = |purpose: &str, address: Address, op: BusOp| {
            accesses.push(StaticAccess {
                purpose: format!("{} {purpose}", master.name),
                master: id,
                address,
                op,
            });
        };
        match master.kind {
            MasterKind::Fetch => {
                push("reset vector fetch", boot.reset_vector, BusOp::Read);
                push("user program fetch", boot.flash_boot_address(), BusOp::Read);
            }
            MasterKind::DebugBridge => {
                push("boot image read", boot.reset_vector, BusOp::Read);
                push("csr read", csr_base, BusOp::Read);
                push("csr write", csr_base, BusOp::Write(0));
            }
        }
    }
    accesses
}

fn constant(name: &str, value: impl Into<u64>) -> Constant {
    Constant {
        name: name.to_owned(),
        value: value.into(),
    }
}
