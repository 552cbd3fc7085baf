//! Clock tree: one board oscillator fanned out into named clock domains.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ClockError;

/// How a domain's reset is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetPolicy {
    /// Reset is a level sampled on the domain's own clock edges.
    Synchronous,
    /// Reset may assert at any time; deassertion passes a synchronizer.
    Asynchronous,
    /// Domain has no reset at all.
    ResetLess,
}

impl ResetPolicy {
    /// Returns `true` when the domain carries a reset signal.
    #[must_use]
    pub const fn has_reset(self) -> bool {
        !matches!(self, Self::ResetLess)
    }
}

/// Where a domain's clock comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ClockSource {
    /// Raw oscillator passthrough.
    Oscillator,
    /// Same clock net as another domain.
    Alias {
        /// Domain whose clock is reused.
        domain: String,
    },
    /// PLL output derived from the oscillator.
    Pll {
        /// Feedback multiplier.
        multiply: u32,
        /// Output divider.
        divide: u32,
    },
}

/// A named clock domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClockDomain {
    /// Domain name.
    pub name: String,
    /// Reset discipline.
    pub reset_policy: ResetPolicy,
    /// Clock source.
    pub source: ClockSource,
}

impl ClockDomain {
    /// Domain clocked straight from the oscillator.
    #[must_use]
    pub fn oscillator(name: impl Into<String>, reset_policy: ResetPolicy) -> Self {
        Self {
            name: name.into(),
            source: ClockSource::Oscillator,
            reset_policy,
        }
    }

    /// Domain sharing another domain's clock net.
    #[must_use]
    pub fn alias(
        name: impl Into<String>,
        domain: impl Into<String>,
        reset_policy: ResetPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            source: ClockSource::Alias {
                domain: domain.into(),
            },
            reset_policy,
        }
    }
}

/// Board oscillator description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Oscillator {
    /// Board pin/net name.
    pub name: String,
    /// Frequency in hertz.
    pub frequency_hz: u32,
}

impl Oscillator {
    /// Clock period in nanoseconds.
    #[must_use]
    pub fn period_ns(&self) -> f64 {
        period_ns(self.frequency_hz)
    }
}

/// Period in nanoseconds of a clock running at `frequency_hz`.
#[must_use]
pub fn period_ns(frequency_hz: u32) -> f64 {
    1e9 / f64::from(frequency_hz)
}

/// Clock output pin driven from a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClockOutput {
    /// Board pin/net name.
    pub pin: String,
    /// Domain driving the pin.
    pub domain: String,
}

/// Validated set of clock domains sharing one oscillator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockTree {
    oscillator: Oscillator,
    domains: Vec<ClockDomain>,
    outputs: Vec<ClockOutput>,
}

impl ClockTree {
    /// Builds and validates a clock tree.
    ///
    /// # Errors
    ///
    /// - [`ClockError::ZeroFrequency`] for a zero-hertz oscillator or PLL.
    /// - [`ClockError::DuplicateDomain`] for a repeated domain name.
    /// - [`ClockError::UnknownDomain`] for an alias or output naming no domain.
    /// - [`ClockError::AliasCycle`] when aliases loop.
    pub fn new(
        oscillator: Oscillator,
        domains: Vec<ClockDomain>,
        outputs: Vec<ClockOutput>,
    ) -> Result<Self, ClockError> {
        if oscillator.frequency_hz == 0 {
            return Err(ClockError::ZeroFrequency {
                name: oscillator.name,
            });
        }

        for (index, domain) in domains.iter().enumerate() {
            if domains[..index].iter().any(|d| d.name == domain.name) {
                return Err(ClockError::DuplicateDomain(domain.name.clone()));
            }
        }

        let tree = Self {
            oscillator,
            domains,
            outputs,
        };

        for domain in &tree.domains {
            let frequency = tree.frequency_hz(&domain.name)?;
            debug!(
                "clock domain {} at {frequency} Hz ({:?} reset)",
                domain.name, domain.reset_policy
            );
        }
        for output in &tree.outputs {
            tree.domain(&output.domain)?;
        }

        Ok(tree)
    }

    /// Board oscillator.
    #[must_use]
    pub const fn oscillator(&self) -> &Oscillator {
        &self.oscillator
    }

    /// Declared domains in declaration order.
    #[must_use]
    pub fn domains(&self) -> &[ClockDomain] {
        &self.domains
    }

    /// Clock output pins.
    #[must_use]
    pub fn outputs(&self) -> &[ClockOutput] {
        &self.outputs
    }

    /// Looks a domain up by name.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::UnknownDomain`] when no such domain exists.
    pub fn domain(&self, name: &str) -> Result<&ClockDomain, ClockError> {
        self.domains
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ClockError::UnknownDomain(name.to_owned()))
    }

    /// Follows aliases from `name` to the domain that owns the clock net.
    ///
    /// Every oscillator passthrough and every PLL output is its own net.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::UnknownDomain`] or [`ClockError::AliasCycle`].
    pub fn net_root(&self, name: &str) -> Result<&ClockDomain, ClockError> {
        let mut current = self.domain(name)?;
        let mut hops = 0;
        while let ClockSource::Alias { domain } = &current.source {
            hops += 1;
            if hops > self.domains.len() {
                return Err(ClockError::AliasCycle(name.to_owned()));
            }
            current = self.domain(domain)?;
        }
        Ok(current)
    }

    /// Checks that `por` is `system` itself or an alias of its clock net.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::PorDomainMismatch`] when the two domains resolve
    /// to different nets, or any lookup error of [`Self::net_root`].
    pub fn check_por_net(&self, por: &str, system: &str) -> Result<(), ClockError> {
        if self.net_root(por)?.name == self.net_root(system)?.name {
            Ok(())
        } else {
            Err(ClockError::PorDomainMismatch {
                por: por.to_owned(),
                system: system.to_owned(),
            })
        }
    }

    /// Resolves the frequency of a domain, following aliases.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::UnknownDomain`], [`ClockError::AliasCycle`] or
    /// [`ClockError::ZeroFrequency`] when the domain cannot be resolved.
    pub fn frequency_hz(&self, name: &str) -> Result<u32, ClockError> {
        let root = self.net_root(name)?;
        match &root.source {
            ClockSource::Pll { multiply, divide } => {
                let frequency = if *divide == 0 {
                    0
                } else {
                    u64::from(self.oscillator.frequency_hz) * u64::from(*multiply)
                        / u64::from(*divide)
                };
                u32::try_from(frequency)
                    .ok()
                    .filter(|&f| f > 0)
                    .ok_or_else(|| ClockError::ZeroFrequency {
                        name: root.name.clone(),
                    })
            }
            ClockSource::Oscillator | ClockSource::Alias { .. } => {
                Ok(self.oscillator.frequency_hz)
            }
        }
    }
}

impl fmt::Display for ClockTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "oscillator {} @ {} Hz",
            self.oscillator.name, self.oscillator.frequency_hz
        )?;
        for domain in &self.domains {
            let source = match &domain.source {
                ClockSource::Oscillator => self.oscillator.name.clone(),
                ClockSource::Alias { domain } => format!("alias of {domain}"),
                ClockSource::Pll { multiply, divide } => format!("pll x{multiply}/{divide}"),
            };
            writeln!(f, "  {:<8} {source} ({:?})", domain.name, domain.reset_policy)?;
        }
        Ok(())
    }
}
