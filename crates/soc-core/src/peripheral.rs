//! Peripheral descriptors for the external IP wired onto the bus.
//!
//! The set is closed: SPI flash controller, SDRAM controller and UART debug
//! bridge. Each descriptor states which bus windows it serves, whether it
//! masters the bus, which CSR bank it owns and which constants it publishes.

use serde::{Deserialize, Serialize};

use crate::boot::BootConstants;
use crate::bus::{Access, MasterKind};
use crate::error::AssemblyError;
use crate::region::{Address, RegionKind};

/// Name of the SDRAM region registered in the memory map.
pub const MAIN_RAM_REGION: &str = "main_ram";

/// Board facts a descriptor needs while elaborating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElaborationContext<'a> {
    /// Derived boot layout.
    pub boot: &'a BootConstants,
    /// System clock frequency in hertz.
    pub sys_clk_hz: u32,
}

/// Bus window served by a slave.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlaveWindow {
    /// Region name to claim.
    pub region: String,
    /// Bus base address.
    pub base: Address,
    /// Window length.
    pub size: u32,
    /// Region classification.
    pub kind: RegionKind,
    /// Slave-relative address of the window's first byte.
    pub slave_offset: u32,
    /// Access rights.
    pub access: Access,
}

/// Bus-slave capability of a peripheral.
pub trait BusSlavePort {
    /// Windows this peripheral serves, in ascending address order.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Peripheral`] when the peripheral's parameters
    /// cannot be mapped.
    fn windows(&self, ctx: &ElaborationContext<'_>) -> Result<Vec<SlaveWindow>, AssemblyError>;
}

/// SPI flash controller parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SpiFlashConfig {
    /// Flash part number.
    pub model: String,
    /// Bus address of the flash window.
    pub base: Address,
    /// Device size in bytes.
    pub total_size: u32,
    /// Program page size in bytes.
    pub page_size: u32,
    /// Erase sector size in bytes.
    pub sector_size: u32,
    /// Dummy bits between address and data on reads.
    pub read_dummy_bits: u8,
    /// SPI clock divider relative to the system clock.
    pub clock_div: u8,
}

impl Default for SpiFlashConfig {
    fn default() -> Self {
        Self {
            model: "n25q32".into(),
            base: 0x2000_0000,
            total_size: 4 * 1024 * 1024,
            page_size: 256,
            sector_size: 0x1_0000,
            read_dummy_bits: 8,
            clock_div: 2,
        }
    }
}

impl SpiFlashConfig {
    /// SPI clock frequency for a given system clock.
    #[must_use]
    pub fn spi_clock_hz(&self, sys_clk_hz: u32) -> u32 {
        sys_clk_hz / u32::from(self.clock_div.max(1))
    }

    fn check(&self) -> Result<(), AssemblyError> {
        let fail = |detail: String| AssemblyError::Peripheral {
            peripheral: "spiflash".into(),
            detail,
        };
        if !self.page_size.is_power_of_two() || !self.sector_size.is_power_of_two() {
            return Err(fail(format!(
                "page ({:#x}) and sector ({:#x}) sizes must be powers of two",
                self.page_size, self.sector_size
            )));
        }
        if self.sector_size < self.page_size || self.total_size % self.sector_size != 0 {
            return Err(fail(format!(
                "{:#x} bytes is not a whole number of {:#x}-byte sectors",
                self.total_size, self.sector_size
            )));
        }
        if self.clock_div == 0 {
            return Err(fail("clock divider must be non-zero".into()));
        }
        Ok(())
    }
}

impl BusSlavePort for SpiFlashConfig {
    fn windows(&self, ctx: &ElaborationContext<'_>) -> Result<Vec<SlaveWindow>, AssemblyError> {
        self.check()?;
        if ctx.boot.flash_base != self.base {
            return Err(AssemblyError::Peripheral {
                peripheral: "spiflash".into(),
                detail: format!(
                    "boot layout assumes flash at {:#010x} but the controller sits at {:#010x}",
                    ctx.boot.flash_base, self.base
                ),
            });
        }
        Ok(ctx
            .boot
            .regions()
            .into_iter()
            .map(|region| SlaveWindow {
                region: region.name.to_owned(),
                base: region.base,
                size: region.size,
                kind: region.kind,
                slave_offset: region.base - self.base,
                access: Access::ReadOnly,
            })
            .collect())
    }
}

/// SDRAM address geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SdramGeometry {
    /// Bank address bits.
    pub bank_bits: u8,
    /// Row address bits.
    pub row_bits: u8,
    /// Column address bits.
    pub col_bits: u8,
}

/// SDRAM timing parameters in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SdramTiming {
    /// Precharge period.
    pub t_rp_ns: u32,
    /// Activate to read/write delay.
    pub t_rcd_ns: u32,
    /// Write recovery time.
    pub t_wr_ns: u32,
    /// Average refresh interval.
    pub t_refi_ns: u32,
    /// Refresh cycle time.
    pub t_rfc_ns: u32,
}

/// SDRAM timing parameters in system clock cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SdramCycles {
    /// Precharge period.
    pub t_rp: u32,
    /// Activate to read/write delay.
    pub t_rcd: u32,
    /// Write recovery time.
    pub t_wr: u32,
    /// Average refresh interval.
    pub t_refi: u32,
    /// Refresh cycle time.
    pub t_rfc: u32,
}

/// SDRAM chip description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SdramModule {
    /// Part number.
    pub name: String,
    /// Data bus width in bits.
    pub data_width: u8,
    /// Controller to PHY clock ratio.
    pub rate: String,
    /// Address geometry.
    pub geometry: SdramGeometry,
    /// Timing parameters.
    pub timing: SdramTiming,
}

impl SdramModule {
    /// Alliance AS4C16M16: 4 banks x 8192 rows x 512 columns x 16 bits.
    #[must_use]
    pub fn as4c16m16() -> Self {
        Self {
            name: "AS4C16M16".into(),
            data_width: 16,
            rate: "1:1".into(),
            geometry: SdramGeometry {
                bank_bits: 2,
                row_bits: 13,
                col_bits: 9,
            },
            timing: SdramTiming {
                t_rp_ns: 18,
                t_rcd_ns: 18,
                t_wr_ns: 12,
                t_refi_ns: 7812,
                t_rfc_ns: 60,
            },
        }
    }

    /// Capacity in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        let address_bits = u32::from(self.geometry.bank_bits)
            + u32::from(self.geometry.row_bits)
            + u32::from(self.geometry.col_bits);
        1_u64
            .checked_shl(address_bits)
            .map_or(u64::MAX, |words| words.saturating_mul(u64::from(self.data_width) / 8))
    }

    /// Timing parameters rounded up to whole cycles at `sys_clk_hz`.
    #[must_use]
    pub fn cycles(&self, sys_clk_hz: u32) -> SdramCycles {
        let t = &self.timing;
        SdramCycles {
            t_rp: ns_to_cycles(t.t_rp_ns, sys_clk_hz),
            t_rcd: ns_to_cycles(t.t_rcd_ns, sys_clk_hz),
            t_wr: ns_to_cycles(t.t_wr_ns, sys_clk_hz),
            t_refi: ns_to_cycles(t.t_refi_ns, sys_clk_hz),
            t_rfc: ns_to_cycles(t.t_rfc_ns, sys_clk_hz),
        }
    }
}

/// Converts nanoseconds to clock cycles, rounding up.
#[must_use]
pub fn ns_to_cycles(ns: u32, clk_hz: u32) -> u32 {
    let scaled = u64::from(ns) * u64::from(clk_hz);
    u32::try_from(scaled.div_ceil(1_000_000_000)).unwrap_or(u32::MAX)
}

/// SDRAM controller parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SdramConfig {
    /// Bus address of main RAM.
    pub base: Address,
    /// Attached chip.
    pub module: SdramModule,
}

impl Default for SdramConfig {
    fn default() -> Self {
        Self {
            base: 0x4000_0000,
            module: SdramModule::as4c16m16(),
        }
    }
}

impl BusSlavePort for SdramConfig {
    fn windows(&self, _ctx: &ElaborationContext<'_>) -> Result<Vec<SlaveWindow>, AssemblyError> {
        if self.module.data_width == 0 || self.module.data_width % 8 != 0 {
            return Err(AssemblyError::Peripheral {
                peripheral: "sdram".into(),
                detail: format!("data width {} is not a whole number of bytes", self.module.data_width),
            });
        }
        let size = u32::try_from(self.module.size_bytes()).map_err(|_| AssemblyError::Peripheral {
            peripheral: "sdram".into(),
            detail: format!(
                "{} is {:#x} bytes, larger than a 32-bit window",
                self.module.name,
                self.module.size_bytes()
            ),
        })?;
        Ok(vec![SlaveWindow {
            region: MAIN_RAM_REGION.into(),
            base: self.base,
            size,
            kind: RegionKind::ExternalStorage,
            slave_offset: 0,
            access: Access::ReadWrite,
        }])
    }
}

/// UART debug bridge parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UartBridgeConfig {
    /// Line rate in baud.
    pub baudrate: u32,
}

impl Default for UartBridgeConfig {
    fn default() -> Self {
        Self { baudrate: 115_200 }
    }
}

impl UartBridgeConfig {
    /// Phase-accumulator increment `round(baud * 2^32 / clk)`.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Peripheral`] when the baud rate is zero or not
    /// below the system clock.
    pub fn tuning_word(&self, sys_clk_hz: u32) -> Result<u32, AssemblyError> {
        if self.baudrate == 0 || self.baudrate >= sys_clk_hz {
            return Err(AssemblyError::Peripheral {
                peripheral: "uart_bridge".into(),
                detail: format!(
                    "{} baud cannot be generated from a {sys_clk_hz} Hz clock",
                    self.baudrate
                ),
            });
        }
        let clk = u64::from(sys_clk_hz);
        let word = ((u64::from(self.baudrate) << 32) + clk / 2) / clk;
        // baudrate < clk keeps the quotient below 2^32.
        Ok(u32::try_from(word).unwrap_or(u32::MAX))
    }
}

impl BusSlavePort for UartBridgeConfig {
    fn windows(&self, _ctx: &ElaborationContext<'_>) -> Result<Vec<SlaveWindow>, AssemblyError> {
        Ok(Vec::new())
    }
}

/// Part identity of an instantiated peripheral, as published in the memory map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PeripheralSummary {
    /// Instance name.
    pub name: String,
    /// Attached part number, when the peripheral drives an external chip.
    pub model: Option<String>,
    /// Controller to PHY clock ratio, for memory controllers.
    pub rate: Option<String>,
}

/// Closed set of peripherals instantiated by the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Peripheral {
    /// SPI flash controller (boot ROM and user flash).
    SpiFlash(SpiFlashConfig),
    /// SDRAM controller and PHY.
    Sdram(SdramConfig),
    /// UART-to-bus debug bridge.
    UartBridge(UartBridgeConfig),
}

impl Peripheral {
    /// Instance name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SpiFlash(_) => "spiflash",
            Self::Sdram(_) => "sdram",
            Self::UartBridge(_) => "uart_bridge",
        }
    }

    /// Master role, for peripherals that drive the bus.
    #[must_use]
    pub const fn master_kind(&self) -> Option<MasterKind> {
        match self {
            Self::UartBridge(_) => Some(MasterKind::DebugBridge),
            Self::SpiFlash(_) | Self::Sdram(_) => None,
        }
    }

    /// CSR banks owned by this peripheral beyond the base table.
    #[must_use]
    pub const fn csr_banks(&self) -> &'static [&'static str] {
        match self {
            Self::SpiFlash(_) => &["spiflash"],
            Self::Sdram(_) => &["sdrphy"],
            Self::UartBridge(_) => &[],
        }
    }

    /// Part identity for the published description.
    #[must_use]
    pub fn summary(&self) -> PeripheralSummary {
        let (model, rate) = match self {
            Self::SpiFlash(flash) => (Some(flash.model.clone()), None),
            Self::Sdram(sdram) => (
                Some(sdram.module.name.clone()),
                Some(sdram.module.rate.clone()),
            ),
            Self::UartBridge(_) => (None, None),
        };
        PeripheralSummary {
            name: self.name().to_owned(),
            model,
            rate,
        }
    }

    /// Constants this peripheral publishes to firmware.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::Peripheral`] when a derived constant cannot be
    /// computed.
    pub fn constants(&self, ctx: &ElaborationContext<'_>) -> Result<Vec<(String, u64)>, AssemblyError> {
        Ok(match self {
            Self::SpiFlash(flash) => vec![
                ("SPIFLASH_PAGE_SIZE".into(), u64::from(flash.page_size)),
                ("SPIFLASH_SECTOR_SIZE".into(), u64::from(flash.sector_size)),
                ("SPIFLASH_DUMMY_BITS".into(), u64::from(flash.read_dummy_bits)),
                (
                    "SPIFLASH_CLOCK_FREQUENCY".into(),
                    u64::from(flash.spi_clock_hz(ctx.sys_clk_hz)),
                ),
            ],
            Self::Sdram(sdram) => {
                let cycles = sdram.module.cycles(ctx.sys_clk_hz);
                vec![
                    ("SDRAM_T_RP".into(), u64::from(cycles.t_rp)),
                    ("SDRAM_T_RCD".into(), u64::from(cycles.t_rcd)),
                    ("SDRAM_T_WR".into(), u64::from(cycles.t_wr)),
                    ("SDRAM_T_REFI".into(), u64::from(cycles.t_refi)),
                    ("SDRAM_T_RFC".into(), u64::from(cycles.t_rfc)),
                ]
            }
            Self::UartBridge(uart) => vec![
                ("UART_BRIDGE_BAUDRATE".into(), u64::from(uart.baudrate)),
                (
                    "UART_BRIDGE_TUNING_WORD".into(),
                    u64::from(uart.tuning_word(ctx.sys_clk_hz)?),
                ),
            ],
        })
    }
}

impl BusSlavePort for Peripheral {
    fn windows(&self, ctx: &ElaborationContext<'_>) -> Result<Vec<SlaveWindow>, AssemblyError> {
        match self {
            Self::SpiFlash(flash) => flash.windows(ctx),
            Self::Sdram(sdram) => sdram.windows(ctx),
            Self::UartBridge(uart) => uart.windows(ctx),
        }
    }
}
