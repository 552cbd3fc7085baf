//! Execute-in-place boot layout inside the SPI flash window.
//!
//! Flash holds, in order: the FPGA gateware, the boot image the CPU starts
//! executing at reset, then a user program region that runs to the end of the
//! device minus a small grace area.

use serde::{Deserialize, Serialize};

use crate::error::BootError;
use crate::region::{Address, RegionKind, ADDRESS_SPACE_END};

/// Name of the boot image region registered in the memory map.
pub const ROM_REGION: &str = "rom";
/// Name of the user program region registered in the memory map.
pub const USER_FLASH_REGION: &str = "user_flash";
/// Name of the region covering the gateware bitstream.
pub const GATEWARE_REGION: &str = "gateware";

/// Inputs to the boot address resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BootParams {
    /// Bus address where the flash window starts.
    pub flash_base: Address,
    /// Bytes reserved at the start of flash for the gateware bitstream.
    pub gateware_size: u32,
    /// Bytes reserved for the boot image right after the gateware.
    pub boot_image_size: u32,
    /// Total flash device size in bytes.
    pub flash_total_size: u32,
    /// Bytes left unclaimed at the end of flash.
    pub safety_margin: u32,
}

/// Derived boot layout exported to firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BootConstants {
    /// Bus address where the flash window starts.
    pub flash_base: Address,
    /// Bytes reserved for the gateware bitstream.
    pub gateware_size: u32,
    /// Bytes reserved for the boot image.
    pub boot_image_size: u32,
    /// CPU reset address: first byte of the boot image.
    pub reset_vector: Address,
    /// First byte of the user program region.
    pub user_region_base: Address,
    /// Length of the user program region.
    pub user_region_size: u32,
}

/// Region claim derived from the boot layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BootRegion {
    /// Region name.
    pub name: &'static str,
    /// Base address.
    pub base: Address,
    /// Length in bytes.
    pub size: u32,
    /// Region classification.
    pub kind: RegionKind,
}

impl BootParams {
    /// Computes the reset vector and user flash region.
    ///
    /// # Errors
    ///
    /// - [`BootError::EmptyBootImage`] when `boot_image_size == 0`.
    /// - [`BootError::FlashOutOfRange`] when the flash window passes 4 GiB.
    /// - [`BootError::Misconfiguration`] when gateware, boot image and margin
    ///   leave no room for user code.
    pub fn resolve(&self) -> Result<BootConstants, BootError> {
        if self.boot_image_size == 0 {
            return Err(BootError::EmptyBootImage);
        }

        let flash_end = u64::from(self.flash_base) + u64::from(self.flash_total_size);
        if flash_end > ADDRESS_SPACE_END {
            return Err(BootError::FlashOutOfRange {
                flash_base: self.flash_base,
                flash_total_size: u64::from(self.flash_total_size),
            });
        }

        let reserved = u64::from(self.gateware_size)
            + u64::from(self.boot_image_size)
            + u64::from(self.safety_margin);
        let misconfigured = || BootError::Misconfiguration {
            gateware_size: u64::from(self.gateware_size),
            boot_image_size: u64::from(self.boot_image_size),
            safety_margin: u64::from(self.safety_margin),
            flash_total_size: u64::from(self.flash_total_size),
        };
        let user_region_size = u64::from(self.flash_total_size)
            .checked_sub(reserved)
            .filter(|&size| size > 0)
            .ok_or_else(misconfigured)?;

        // Both sums stay below flash_end, which already fits in 32 bits.
        let reset_vector = self.flash_base + self.gateware_size;
        let user_region_base = reset_vector + self.boot_image_size;

        Ok(BootConstants {
            flash_base: self.flash_base,
            gateware_size: self.gateware_size,
            boot_image_size: self.boot_image_size,
            reset_vector,
            user_region_base,
            user_region_size: u32::try_from(user_region_size).map_err(|_| misconfigured())?,
        })
    }
}

impl BootConstants {
    /// Address firmware jumps to once the boot image hands over control.
    #[must_use]
    pub const fn flash_boot_address(&self) -> Address {
        self.user_region_base
    }

    /// Claims derived from this layout, in ascending address order.
    ///
    /// The gateware claim is omitted when no gateware space is reserved.
    #[must_use]
    pub fn regions(&self) -> Vec<BootRegion> {
        let mut regions = Vec::with_capacity(3);
        if self.gateware_size > 0 {
            regions.push(BootRegion {
                name: GATEWARE_REGION,
                base: self.flash_base,
                size: self.gateware_size,
                kind: RegionKind::ExternalStorage,
            });
        }
        regions.push(BootRegion {
            name: ROM_REGION,
            base: self.reset_vector,
            size: self.boot_image_size,
            kind: RegionKind::CachedLinker,
        });
        regions.push(BootRegion {
            name: USER_FLASH_REGION,
            base: self.user_region_base,
            size: self.user_region_size,
            kind: RegionKind::CachedLinker,
        });
        regions
    }
}
