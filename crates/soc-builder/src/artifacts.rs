//! Text renderings of an assembled SoC for firmware and tooling.
//!
//! Every renderer is a pure function of the [`SocDescription`], so two runs
//! over the same platform produce byte-identical files.

use serde::Serialize;
use soc_core::{Constant, PeripheralSummary, RegionKind, SocDescription, CSR_BANK_STRIDE};

/// Generated file kinds, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Linker `MEMORY` block.
    LinkerRegions,
    /// C header with region bases and sizes.
    MemHeader,
    /// C header with firmware constants and CSR bank bases.
    SocHeader,
    /// Flat CSV of banks, constants and regions.
    CsrCsv,
    /// Machine-readable memory map.
    MemoryMapJson,
}

impl ArtifactKind {
    /// Every artifact kind.
    pub const ALL: [Self; 5] = [
        Self::LinkerRegions,
        Self::MemHeader,
        Self::SocHeader,
        Self::CsrCsv,
        Self::MemoryMapJson,
    ];

    /// File name the artifact is written under.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::LinkerRegions => "regions.ld",
            Self::MemHeader => "mem.h",
            Self::SocHeader => "soc.h",
            Self::CsrCsv => "csr.csv",
            Self::MemoryMapJson => "memory_map.json",
        }
    }
}

/// Renders one artifact.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] when the JSON memory map cannot be encoded.
pub fn render(kind: ArtifactKind, soc: &SocDescription) -> serde_json::Result<String> {
    Ok(match kind {
        ArtifactKind::LinkerRegions => render_linker_regions(soc),
        ArtifactKind::MemHeader => render_mem_header(soc),
        ArtifactKind::SocHeader => render_soc_header(soc),
        ArtifactKind::CsrCsv => render_csr_csv(soc),
        ArtifactKind::MemoryMapJson => render_memory_map_json(soc)?,
    })
}

/// Linker `MEMORY` block listing every linkable region.
#[must_use]
pub fn render_linker_regions(soc: &SocDescription) -> String {
    let mut out = String::from("MEMORY {\n");
    for region in soc.memory_map().iter().filter(|r| r.kind.is_linkable()) {
        out.push_str(&format!(
            "\t{} : ORIGIN = {:#010x}, LENGTH = {:#010x}\n",
            region.name, region.base, region.size
        ));
    }
    out.push_str("}\n");
    out
}

/// `mem.h`: base and size define pair per region.
#[must_use]
pub fn render_mem_header(soc: &SocDescription) -> String {
    let mut out = header_guard_open("MEM");
    for region in soc.memory_map().iter() {
        let symbol = region.name.to_uppercase();
        out.push_str(&format!("#define {symbol}_BASE {:#010x}L\n", region.base));
        out.push_str(&format!("#define {symbol}_SIZE {:#010x}\n", region.size));
    }
    out.push_str(&header_guard_close("MEM"));
    out
}

/// `soc.h`: published constants followed by CSR bank bases.
#[must_use]
pub fn render_soc_header(soc: &SocDescription) -> String {
    let mut out = header_guard_open("SOC");
    for constant in &soc.constants {
        let value = format_value(&constant.name, constant.value);
        out.push_str(&format!("#define {} {value}\n", constant.name));
    }
    out.push('\n');
    out.push_str(&format!("#define CSR_BASE {:#010x}L\n", soc.csr_base));
    for bank in soc.csr.iter() {
        if let Some(address) = soc.csr.bank_address(soc.csr_base, &bank.name) {
            out.push_str(&format!(
                "#define CSR_{}_BASE {address:#010x}L\n",
                bank.name.to_uppercase()
            ));
        }
    }
    out.push_str(&header_guard_close("SOC"));
    out
}

/// `csr.csv`: one row per CSR bank, constant and memory region.
#[must_use]
pub fn render_csr_csv(soc: &SocDescription) -> String {
    let mut out = String::from("#type,name,address/value,size,kind\n");
    for bank in soc.csr.iter() {
        if let Some(address) = soc.csr.bank_address(soc.csr_base, &bank.name) {
            out.push_str(&format!(
                "csr_base,{},{address:#010x},{CSR_BANK_STRIDE},\n",
                bank.name
            ));
        }
    }
    for constant in &soc.constants {
        out.push_str(&format!(
            "constant,{},{},,\n",
            constant.name.to_lowercase(),
            constant.value
        ));
    }
    for region in soc.memory_map().iter() {
        out.push_str(&format!(
            "memory_region,{},{:#010x},{},{}\n",
            region.name,
            region.base,
            region.size,
            region.kind.as_str()
        ));
    }
    out
}

#[derive(Serialize)]
struct RegionEntry<'a> {
    name: &'a str,
    base: u32,
    size: u32,
    kind: RegionKind,
    slave: Option<&'a str>,
    linkable: bool,
}

#[derive(Serialize)]
struct MemoryMapDocument<'a> {
    device: &'a str,
    clock_frequency_hz: u32,
    regions: Vec<RegionEntry<'a>>,
    masters: Vec<&'a str>,
    peripherals: &'a [PeripheralSummary],
    constants: &'a [Constant],
    csr_banks: Vec<(&'a str, u8)>,
}

/// `memory_map.json`: regions with their slave ports, masters, peripheral
/// parts, constants and CSR banks.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] when encoding fails.
pub fn render_memory_map_json(soc: &SocDescription) -> serde_json::Result<String> {
    let regions = soc
        .memory_map()
        .iter()
        .map(|region| RegionEntry {
            name: &region.name,
            base: region.base,
            size: region.size,
            kind: region.kind,
            slave: soc
                .interconnect
                .bindings()
                .find(|b| b.region == region.name)
                .and_then(|b| soc.slaves.get(b.slave.index()))
                .map(String::as_str),
            linkable: region.kind.is_linkable(),
        })
        .collect();
    let document = MemoryMapDocument {
        device: &soc.device,
        clock_frequency_hz: soc.sys_clk_hz,
        regions,
        masters: soc
            .interconnect
            .masters()
            .iter()
            .map(|m| m.name.as_str())
            .collect(),
        peripherals: &soc.peripherals,
        constants: &soc.constants,
        csr_banks: soc.csr.iter().map(|b| (b.name.as_str(), b.index)).collect(),
    };
    let mut json = serde_json::to_string_pretty(&document)?;
    json.push('\n');
    Ok(json)
}

/// Addresses print as hex, everything else as decimal.
fn format_value(name: &str, value: u64) -> String {
    if name.ends_with("_ADDR") || name.ends_with("_ADDRESS") || name.ends_with("_BASE") {
        format!("{value:#010x}")
    } else {
        value.to_string()
    }
}

fn header_guard_open(name: &str) -> String {
    format!("#ifndef __GENERATED_{name}_H\n#define __GENERATED_{name}_H\n\n")
}

fn header_guard_close(name: &str) -> String {
    format!("\n#endif /* __GENERATED_{name}_H */\n")
}
