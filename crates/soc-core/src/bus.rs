//! Shared address-decoded bus: master ports, slave bindings and routing.
//!
//! [`Interconnect`] holds the routing table built over a frozen
//! [`MemoryMap`]. [`SystemBus`] executes transactions against concrete
//! [`BusSlave`] implementations, one complete transaction at a time.

use std::collections::VecDeque;
use std::fmt;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RoutingError;
use crate::region::{Address, MemoryMap, MemoryRegion};

/// Number of masters an interconnect can address.
pub const MAX_MASTERS: usize = 1 << u8::BITS;

/// Identifier of a master port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MasterId(u8);

impl MasterId {
    /// Wraps a raw master port number.
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw master port number.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a slave port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlaveId(usize);

impl SlaveId {
    /// Wraps a raw slave port number.
    #[must_use]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw slave port number.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Role of a bus master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MasterKind {
    /// Host-driven debug bridge (UART to bus).
    DebugBridge,
    /// Instruction fetch unit of a soft CPU.
    Fetch,
}

/// Attached master port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusMaster {
    /// Master name.
    pub name: String,
    /// Master role.
    pub kind: MasterKind,
}

/// Access rights granted by a slave window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    /// Reads only; writes are rejected at routing time.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// Transaction operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusOp {
    /// Word read.
    Read,
    /// Word write carrying the data.
    Write(u32),
}

impl BusOp {
    /// Returns `true` for writes.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write(_))
    }
}

/// Slave port bound to one region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlaveBinding {
    /// Region served by the slave.
    pub region: String,
    /// Slave port.
    pub slave: SlaveId,
    /// Slave-relative address of the region's first byte.
    pub offset: u32,
    /// Access rights.
    pub access: Access,
}

/// Result of a successful address decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlaveHandle {
    /// Target slave port.
    pub slave: SlaveId,
    /// Index of the decoded region in the memory map.
    pub region: usize,
    /// Slave-relative address to present to the slave.
    pub offset: u32,
}

/// Routing table over a frozen memory map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interconnect {
    map: MemoryMap,
    bindings: Vec<Option<SlaveBinding>>,
    masters: Vec<BusMaster>,
}

impl Interconnect {
    /// Creates an interconnect with one unbound slave port per region.
    #[must_use]
    pub fn new(map: MemoryMap) -> Self {
        let bindings = vec![None; map.len()];
        Self {
            map,
            bindings,
            masters: Vec::new(),
        }
    }

    /// Frozen memory map the interconnect decodes against.
    #[must_use]
    pub const fn map(&self) -> &MemoryMap {
        &self.map
    }

    /// Attached masters, indexed by [`MasterId`].
    #[must_use]
    pub fn masters(&self) -> &[BusMaster] {
        &self.masters
    }

    /// Bound slave ports in memory-map order.
    pub fn bindings(&self) -> impl Iterator<Item = &SlaveBinding> {
        self.bindings.iter().flatten()
    }

    /// Binds `slave` to serve `region`, starting at slave-relative `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownRegion`] when the region is absent and
    /// [`RoutingError::AlreadyBound`] when it already has a slave.
    pub fn attach_slave(
        &mut self,
        region: &str,
        slave: SlaveId,
        offset: u32,
        access: Access,
    ) -> Result<(), RoutingError> {
        let index = self
            .map
            .index_of(region)
            .ok_or_else(|| RoutingError::UnknownRegion {
                region: region.to_owned(),
            })?;
        let port = &mut self.bindings[index];
        if port.is_some() {
            return Err(RoutingError::AlreadyBound {
                region: region.to_owned(),
            });
        }
        debug!("slave {} serves '{region}' at offset {offset:#x}", slave.index());
        *port = Some(SlaveBinding {
            region: region.to_owned(),
            slave,
            offset,
            access,
        });
        Ok(())
    }

    /// Attaches a master port.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::DuplicateMaster`] when the name is taken and
    /// [`RoutingError::TooManyMasters`] once every [`MasterId`] is in use.
    pub fn add_master(
        &mut self,
        name: impl Into<String>,
        kind: MasterKind,
    ) -> Result<MasterId, RoutingError> {
        let name = name.into();
        if self.masters.iter().any(|m| m.name == name) {
            return Err(RoutingError::DuplicateMaster { name });
        }
        let id = u8::try_from(self.masters.len())
            .map(MasterId)
            .map_err(|_| RoutingError::TooManyMasters {
                name: name.clone(),
                limit: MAX_MASTERS,
            })?;
        debug!("master {id} '{name}' ({kind:?}) attached");
        self.masters.push(BusMaster { name, kind });
        Ok(id)
    }

    /// Master id by name.
    #[must_use]
    pub fn master(&self, name: &str) -> Option<MasterId> {
        self.masters
            .iter()
            .position(|m| m.name == name)
            .and_then(|i| u8::try_from(i).ok())
            .map(MasterId)
    }

    /// Checks that every region has a slave bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnboundRegion`] naming the first orphan region.
    pub fn check_bindings(&self) -> Result<(), RoutingError> {
        self.map
            .iter()
            .zip(&self.bindings)
            .find(|(_, binding)| binding.is_none())
            .map_or(Ok(()), |(region, _)| {
                Err(RoutingError::UnboundRegion {
                    region: region.name.clone(),
                })
            })
    }

    /// Decodes `address` issued by `master` to exactly one slave.
    ///
    /// # Errors
    ///
    /// - [`RoutingError::UnknownMaster`] when `master` is not attached.
    /// - [`RoutingError::UnmappedAddress`] when no region contains `address`.
    /// - [`RoutingError::UnboundRegion`] when the region has no slave.
    /// - [`RoutingError::ReadOnly`] for writes to read-only windows.
    pub fn route(
        &self,
        master: MasterId,
        address: Address,
        op: BusOp,
    ) -> Result<SlaveHandle, RoutingError> {
        if master.index() >= self.masters.len() {
            return Err(RoutingError::UnknownMaster(master));
        }
        let index = self
            .map
            .index_containing(address)
            .ok_or(RoutingError::UnmappedAddress { master, address })?;
        let region: &MemoryRegion = &self.map.as_slice()[index];
        let within = region
            .offset_of(address)
            .ok_or(RoutingError::UnmappedAddress { master, address })?;
        let binding = self.bindings[index]
            .as_ref()
            .ok_or_else(|| RoutingError::UnboundRegion {
                region: region.name.clone(),
            })?;
        if op.is_write() && binding.access == Access::ReadOnly {
            return Err(RoutingError::ReadOnly {
                master,
                address,
                region: region.name.clone(),
            });
        }

        let handle = SlaveHandle {
            slave: binding.slave,
            region: index,
            offset: binding.offset + within,
        };
        trace!(
            "master {master} {address:#010x} -> slave {} offset {:#x}",
            handle.slave.index(),
            handle.offset
        );
        Ok(handle)
    }
}

/// Access the design is known to perform, checked at assembly time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StaticAccess {
    /// What the access is for, used in log output.
    pub purpose: String,
    /// Issuing master.
    pub master: MasterId,
    /// Target address.
    pub address: Address,
    /// Operation.
    pub op: BusOp,
}

impl Interconnect {
    /// Routes every statically known access, failing on the first one that
    /// does not decode.
    ///
    /// # Errors
    ///
    /// Returns the [`RoutingError`] of the first failing access.
    pub fn check_static_accesses(
        &self,
        accesses: &[StaticAccess],
    ) -> Result<Vec<SlaveHandle>, RoutingError> {
        accesses
            .iter()
            .map(|access| {
                let handle = self.route(access.master, access.address, access.op)?;
                debug!(
                    "{}: {:#010x} reaches '{}'",
                    access.purpose, access.address, self.map.as_slice()[handle.region].name
                );
                Ok(handle)
            })
            .collect()
    }
}

/// Failure reported by a slave implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SlaveError {
    /// Slave could not complete the read.
    #[error("slave read failed at offset {0:#x}")]
    ReadFailed(u32),
    /// Slave could not complete the write.
    #[error("slave write failed at offset {0:#x}")]
    WriteFailed(u32),
}

/// Failure of a complete bus transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum BusError {
    /// Address decode failed.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// Decoded slave port has no implementation attached.
    #[error("slave {0} has no implementation attached")]
    MissingSlave(usize),
    /// Slave rejected the access.
    #[error(transparent)]
    Slave(#[from] SlaveError),
}

/// Bus-slave contract implemented by external IP models.
pub trait BusSlave {
    /// Reads a word at slave-relative `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::ReadFailed`] when the slave cannot serve the read.
    fn read(&mut self, offset: u32) -> Result<u32, SlaveError>;

    /// Writes a word at slave-relative `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::WriteFailed`] when the slave cannot accept the
    /// write.
    fn write(&mut self, offset: u32, value: u32) -> Result<(), SlaveError>;
}

/// One master transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transaction {
    /// Issuing master.
    pub master: MasterId,
    /// Target bus address.
    pub address: Address,
    /// Operation.
    pub op: BusOp,
}

/// Successful transaction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusResponse {
    /// Data returned by a read.
    ReadData(u32),
    /// Write accepted.
    WriteAck,
}

/// Transaction paired with its outcome, in completion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Completion {
    /// Completed transaction.
    pub transaction: Transaction,
    /// Outcome.
    pub result: Result<BusResponse, BusError>,
}

/// Executes transactions from several masters, strictly one at a time.
///
/// Each master has its own FIFO; masters are served round-robin and a
/// transaction is routed and delivered before the next one is accepted.
pub struct SystemBus<'a> {
    interconnect: &'a Interconnect,
    slaves: Vec<Box<dyn BusSlave + 'a>>,
    queues: Vec<VecDeque<Transaction>>,
    next_master: usize,
}

impl fmt::Debug for SystemBus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemBus")
            .field("slaves", &self.slaves.len())
            .field("queued", &self.pending())
            .field("next_master", &self.next_master)
            .finish_non_exhaustive()
    }
}

impl<'a> SystemBus<'a> {
    /// Creates a bus over `interconnect`; `slaves[i]` serves [`SlaveId`] `i`.
    #[must_use]
    pub fn new(interconnect: &'a Interconnect, slaves: Vec<Box<dyn BusSlave + 'a>>) -> Self {
        let queues = vec![VecDeque::new(); interconnect.masters().len()];
        Self {
            interconnect,
            slaves,
            queues,
            next_master: 0,
        }
    }

    /// Queues a transaction behind earlier ones from the same master.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownMaster`] for an unattached master.
    pub fn submit(&mut self, transaction: Transaction) -> Result<(), RoutingError> {
        self.queues
            .get_mut(transaction.master.index())
            .ok_or(RoutingError::UnknownMaster(transaction.master))?
            .push_back(transaction);
        Ok(())
    }

    /// Number of queued transactions across all masters.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Routes and delivers a single transaction immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when routing fails or the slave rejects the access.
    pub fn issue(&mut self, transaction: Transaction) -> Result<BusResponse, BusError> {
        let handle = self.interconnect.route(
            transaction.master,
            transaction.address,
            transaction.op,
        )?;
        let slave = self
            .slaves
            .get_mut(handle.slave.index())
            .ok_or(BusError::MissingSlave(handle.slave.index()))?;
        match transaction.op {
            BusOp::Read => Ok(BusResponse::ReadData(slave.read(handle.offset)?)),
            BusOp::Write(value) => {
                slave.write(handle.offset, value)?;
                Ok(BusResponse::WriteAck)
            }
        }
    }

    /// Completes the next queued transaction in round-robin master order.
    pub fn step(&mut self) -> Option<Completion> {
        let masters = self.queues.len();
        for step in 0..masters {
            let index = (self.next_master + step) % masters;
            if let Some(transaction) = self.queues[index].pop_front() {
                self.next_master = (index + 1) % masters;
                let result = self.issue(transaction);
                return Some(Completion {
                    transaction,
                    result,
                });
            }
        }
        None
    }

    /// Completes every queued transaction.
    pub fn drain(&mut self) -> Vec<Completion> {
        std::iter::from_fn(|| self.step()).collect()
    }
}
