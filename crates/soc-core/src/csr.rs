//! Control/status register bank numbering.
//!
//! The base table is taken as-is; extra peripherals are appended after the
//! highest base index in one ordered pass. The result never changes after
//! allocation.

use serde::{Deserialize, Serialize};

use crate::error::CsrError;
use crate::region::Address;

/// Bytes occupied by one CSR bank.
pub const CSR_BANK_STRIDE: u32 = 0x800;

/// One allocated CSR bank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CsrBank {
    /// Owning component name.
    pub name: String,
    /// Bank index inside the CSR window.
    pub index: u8,
}

/// Immutable CSR bank assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CsrMap {
    banks: Vec<CsrBank>,
}

impl CsrMap {
    /// Allocates banks: `base` keeps its explicit indices, `extra` continues
    /// after the highest base index in list order.
    ///
    /// `capacity` is the number of banks that fit in the CSR window.
    ///
    /// # Errors
    ///
    /// - [`CsrError::DuplicateName`] for a name listed twice.
    /// - [`CsrError::DuplicateIndex`] for two base entries sharing an index.
    /// - [`CsrError::WindowExhausted`] when an index reaches `capacity`.
    pub fn allocate(base: &[CsrBank], extra: &[String], capacity: u16) -> Result<Self, CsrError> {
        let mut banks: Vec<CsrBank> = Vec::with_capacity(base.len() + extra.len());

        for bank in base {
            if banks.iter().any(|b| b.name == bank.name) {
                return Err(CsrError::DuplicateName(bank.name.clone()));
            }
            if let Some(first) = banks.iter().find(|b| b.index == bank.index) {
                return Err(CsrError::DuplicateIndex {
                    first: first.name.clone(),
                    second: bank.name.clone(),
                    index: bank.index,
                });
            }
            check_capacity(&bank.name, u16::from(bank.index), capacity)?;
            banks.push(bank.clone());
        }

        let mut next = base
            .iter()
            .map(|b| u16::from(b.index) + 1)
            .max()
            .unwrap_or(0);
        for name in extra {
            if banks.iter().any(|b| b.name == *name) {
                return Err(CsrError::DuplicateName(name.clone()));
            }
            check_capacity(name, next, capacity)?;
            let index = u8::try_from(next).map_err(|_| CsrError::WindowExhausted {
                name: name.clone(),
                index: next,
                capacity,
            })?;
            banks.push(CsrBank {
                name: name.clone(),
                index,
            });
            next += 1;
        }

        banks.sort_by_key(|b| b.index);
        Ok(Self { banks })
    }

    /// Bank index of `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<u8> {
        self.banks.iter().find(|b| b.name == name).map(|b| b.index)
    }

    /// Bus address of the bank owned by `name` inside a window at `csr_base`.
    #[must_use]
    pub fn bank_address(&self, csr_base: Address, name: &str) -> Option<Address> {
        self.index_of(name)
            .map(|index| csr_base + u32::from(index) * CSR_BANK_STRIDE)
    }

    /// Banks in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = &CsrBank> {
        self.banks.iter()
    }

    /// Number of allocated banks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// Returns `true` when no bank is allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}

/// Number of banks that fit in a CSR window of `window_size` bytes.
#[must_use]
pub fn bank_capacity(window_size: u32) -> u16 {
    u16::try_from(window_size / CSR_BANK_STRIDE).unwrap_or(u16::MAX)
}

fn check_capacity(name: &str, index: u16, capacity: u16) -> Result<(), CsrError> {
    if index >= capacity {
        return Err(CsrError::WindowExhausted {
            name: name.to_owned(),
            index,
            capacity,
        });
    }
    Ok(())
}
