//! Board configuration: everything the assembler needs, with defaults equal to
//! the ice40-hx8k breakout board.
//!
//! Configurations are stored as TOML. Missing tables and keys fall back to the
//! board defaults, so an override file only has to name what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clock::{ClockDomain, ClockOutput, Oscillator, ResetPolicy};
use crate::csr::{CsrBank, CSR_BANK_STRIDE};
use crate::error::ConfigError;
use crate::peripheral::{SdramConfig, SpiFlashConfig, UartBridgeConfig};
use crate::region::Address;
use crate::reset::{MIN_SYNC_STAGES, POR_COUNTER_WIDTH, POR_RESET_CYCLES};

/// Complete board description consumed by [`crate::soc::assemble`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PlatformConfig {
    /// FPGA device name.
    pub device: String,
    /// Synthesis toolchain name.
    pub toolchain: String,
    /// Bytes at the start of flash holding the gateware bitstream.
    pub gateware_size: u32,
    /// Clock tree.
    pub clock: ClockConfig,
    /// Reset generation.
    pub reset: ResetConfig,
    /// Boot image placement.
    pub boot: BootConfig,
    /// SPI flash controller.
    pub spiflash: SpiFlashConfig,
    /// SDRAM controller.
    pub sdram: SdramConfig,
    /// UART debug bridge.
    pub uart_bridge: UartBridgeConfig,
    /// CSR window and bank table.
    pub csr: CsrConfig,
    /// Soft CPU, if any.
    pub cpu: Option<CpuConfig>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            device: "ice40-hx8k-ct256".into(),
            toolchain: "icestorm".into(),
            gateware_size: 0x2_8000,
            clock: ClockConfig::default(),
            reset: ResetConfig::default(),
            boot: BootConfig::default(),
            spiflash: SpiFlashConfig::default(),
            sdram: SdramConfig::default(),
            uart_bridge: UartBridgeConfig::default(),
            csr: CsrConfig::default(),
            cpu: None,
        }
    }
}

/// Oscillator and clock domain declarations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClockConfig {
    /// Domain the bus and peripherals run in.
    pub system_domain: String,
    /// Domain holding the power-on reset counter.
    pub por_domain: String,
    /// Board oscillator.
    pub oscillator: Oscillator,
    /// Declared domains.
    pub domains: Vec<ClockDomain>,
    /// Clock output pins.
    pub outputs: Vec<ClockOutput>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            system_domain: "sys".into(),
            por_domain: "por".into(),
            oscillator: Oscillator {
                name: "clk12".into(),
                frequency_hz: 12_000_000,
            },
            domains: vec![
                ClockDomain::oscillator("sys", ResetPolicy::Synchronous),
                ClockDomain::oscillator("sys_ps", ResetPolicy::ResetLess),
                ClockDomain::alias("por", "sys", ResetPolicy::Asynchronous),
            ],
            outputs: vec![ClockOutput {
                pin: "sdram_clock".into(),
                domain: "sys_ps".into(),
            }],
        }
    }
}

/// Power-on reset and external reset settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResetConfig {
    /// System clock edges the POR holds reset after power-on.
    pub por_cycles: u32,
    /// POR counter register width in bits.
    pub counter_width: u8,
    /// Whether the board exposes an external reset request input.
    pub external_reset: bool,
    /// Synchronizer depth for the external reset request.
    pub synchronizer_stages: u8,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            por_cycles: POR_RESET_CYCLES,
            counter_width: POR_COUNTER_WIDTH,
            external_reset: true,
            synchronizer_stages: MIN_SYNC_STAGES,
        }
    }
}

/// Boot image placement inside flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BootConfig {
    /// Bytes reserved for the boot image after the gateware.
    pub boot_image_size: u32,
    /// Bytes left unclaimed at the end of flash.
    pub safety_margin: u32,
    /// Publish `ROM_DISABLE` so firmware skips the integrated ROM.
    pub rom_disable: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            boot_image_size: 0x8000,
            safety_margin: 0x100,
            rom_disable: true,
        }
    }
}

/// CSR window placement and the fixed part of the bank table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CsrConfig {
    /// Bus address of the CSR window.
    pub base: Address,
    /// Window length in bytes.
    pub size: u32,
    /// Additional banks appended after the peripherals' own banks.
    pub extra_banks: Vec<String>,
    /// Banks with fixed indices.
    pub base_map: Vec<CsrBank>,
}

impl Default for CsrConfig {
    fn default() -> Self {
        let base_map = [
            "ctrl",
            "crg",
            "uart_phy",
            "uart",
            "identifier_mem",
            "timer0",
            "buttons",
            "leds",
            "sdram",
            "l2_cache",
        ]
        .iter()
        .zip(0_u8..)
        .map(|(name, index)| CsrBank {
            name: (*name).to_owned(),
            index,
        })
        .collect();
        Self {
            base: 0x6000_0000,
            size: 0x1_0000,
            extra_banks: Vec::new(),
            base_map,
        }
    }
}

/// Soft CPU attached as a fetch master.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CpuConfig {
    /// CPU variant name.
    pub name: String,
}

/// Loads a platform from a TOML file.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] for a missing file, [`ConfigError::Io`]
/// when it cannot be read, and any error of [`parse_platform_toml`].
pub fn load_platform_toml(path: &Path) -> Result<PlatformConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_platform_toml(&content)
}

/// Parses and validates a platform from a TOML string.
///
/// # Errors
///
/// Returns [`ConfigError::Toml`] on malformed input and
/// [`ConfigError::Validation`] when [`validate_platform`] rejects it.
pub fn parse_platform_toml(toml_str: &str) -> Result<PlatformConfig, ConfigError> {
    let platform: PlatformConfig = toml::from_str(toml_str)?;
    validate_platform(&platform)?;
    Ok(platform)
}

/// Serializes a platform to pretty TOML.
///
/// # Errors
///
/// Returns [`ConfigError::TomlSer`] when serialization fails.
pub fn platform_to_toml(platform: &PlatformConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(platform)?)
}

/// Structural checks that do not need elaboration.
///
/// Address-space and wiring problems are left to the assembler, which reports
/// them with the conflicting names.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] describing the first problem found.
pub fn validate_platform(platform: &PlatformConfig) -> Result<(), ConfigError> {
    let fail = |detail: String| Err(ConfigError::Validation { detail });

    if platform.device.trim().is_empty() {
        return fail("device name is empty".into());
    }
    if platform.clock.system_domain == platform.clock.por_domain {
        return fail(format!(
            "system and power-on reset domains are both '{}'",
            platform.clock.system_domain
        ));
    }
    for name in [&platform.clock.system_domain, &platform.clock.por_domain] {
        if !platform.clock.domains.iter().any(|d| d.name == *name) {
            return fail(format!("domain '{name}' is not declared"));
        }
    }
    if platform.csr.size == 0 || platform.csr.size % CSR_BANK_STRIDE != 0 {
        return fail(format!(
            "csr window size {:#x} is not a non-zero multiple of {CSR_BANK_STRIDE:#x}",
            platform.csr.size
        ));
    }
    if let Some(cpu) = &platform.cpu {
        if cpu.name.trim().is_empty() {
            return fail("cpu name is empty".into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        parse_platform_toml, platform_to_toml, validate_platform, CpuConfig, PlatformConfig,
    };
    use crate::error::ConfigError;

    #[test]
    fn defaults_describe_the_hx8k_board() {
        let platform = PlatformConfig::default();
        assert_eq!(platform.device, "ice40-hx8k-ct256");
        assert_eq!(platform.clock.oscillator.frequency_hz, 12_000_000);
        assert_eq!(platform.spiflash.model, "n25q32");
        assert_eq!(platform.sdram.module.name, "AS4C16M16");
        assert_eq!(platform.reset.por_cycles, 4095);
        assert_eq!(platform.csr.base_map.len(), 10);
        assert_eq!(
            platform.csr.base_map.last().map(|b| (b.name.as_str(), b.index)),
            Some(("l2_cache", 9))
        );
        assert!(platform.cpu.is_none());
        assert_eq!(validate_platform(&platform).ok(), Some(()));
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let platform = parse_platform_toml(
            r#"
            gateware-size = 0x30000

            [uart-bridge]
            baudrate = 9600

            [boot]
            safety-margin = 0x200
            "#,
        )
        .expect("valid override");

        assert_eq!(platform.gateware_size, 0x3_0000);
        assert_eq!(platform.uart_bridge.baudrate, 9600);
        assert_eq!(platform.boot.safety_margin, 0x200);
        assert_eq!(platform.boot.boot_image_size, 0x8000);
        assert_eq!(platform.spiflash, PlatformConfig::default().spiflash);
    }

    #[test]
    fn serialized_defaults_parse_back_unchanged() {
        let platform = PlatformConfig {
            cpu: Some(CpuConfig {
                name: "vexriscv".into(),
            }),
            ..PlatformConfig::default()
        };
        let text = platform_to_toml(&platform).expect("serializes");
        assert_eq!(parse_platform_toml(&text).expect("parses"), platform);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            parse_platform_toml("gateware-size = \"big\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn structural_problems_are_validation_errors() {
        let mut platform = PlatformConfig::default();
        platform.clock.por_domain = "sys".into();
        assert!(matches!(
            validate_platform(&platform),
            Err(ConfigError::Validation { .. })
        ));

        let mut platform = PlatformConfig::default();
        platform.csr.size = 0x900;
        assert!(matches!(
            validate_platform(&platform),
            Err(ConfigError::Validation { .. })
        ));

        let mut platform = PlatformConfig::default();
        platform.clock.system_domain = "fast".into();
        let err = validate_platform(&platform).expect_err("undeclared domain");
        assert_eq!(
            err.to_string(),
            "invalid platform setting: domain 'fast' is not declared"
        );
    }
}
