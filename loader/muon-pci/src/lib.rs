//! PCI bus discovery for the muon loader.
//!
//! Walks the configuration-space address tree (bus, slot, function)
//! over legacy mechanism 1, detects PCI-to-PCI bridges, and reports
//! devices through a caller-supplied visitor. Configuration space is
//! reached through the [`ConfigAccess`] capability, so the walk runs
//! against a synthetic topology in host tests and against I/O ports
//! `0xCF8`/`0xCFC` on hardware.
//!
//! The firmware's PCI BIOS presence report gates everything: no
//! version, or no mechanism-1 support, means no enumeration at all.

#![cfg_attr(not(test), no_std)]

use bitflags::bitflags;

pub mod access;
pub mod addr;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod cam;
mod enumerate;
pub mod info;

pub use access::{ConfigAccess, regs};
pub use addr::DeviceAddr;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use cam::PortCam;
pub use info::{DeviceInfo, DeviceList, DeviceVisitor, class_name};

/// Errors that abort PCI discovery before or during enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciError {
    /// The firmware reported version 0.0 — no usable PCI BIOS.
    UnsupportedVersion,
    /// Configuration mechanism 1 is not available.
    UnsupportedMechanism,
    /// The root bus is multi-function, which this loader does not walk.
    UnsupportedTopology,
}

impl core::fmt::Display for PciError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedVersion => f.write_str("unsupported PCI BIOS version"),
            Self::UnsupportedMechanism => f.write_str("configuration mechanism 1 unavailable"),
            Self::UnsupportedTopology => f.write_str("multi-function root bus unsupported"),
        }
    }
}

bitflags! {
    /// Property word from the firmware's PCI BIOS presence report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HwProps: u16 {
        /// Configuration mechanism 1 supported.
        const MECHANISM_1     = 1 << 0;
        /// Configuration mechanism 2 supported (recognized, not used).
        const MECHANISM_2     = 1 << 1;
        /// Special cycle generation via mechanism 1.
        const SPECIAL_CYCLE_1 = 1 << 4;
        /// Special cycle generation via mechanism 2.
        const SPECIAL_CYCLE_2 = 1 << 5;
    }
}

/// PCI init arguments collected by the previous boot stage.
#[derive(Debug, Clone, Copy)]
pub struct HwInfo {
    /// PCI BIOS major version (BCD).
    pub major: u8,
    /// PCI BIOS minor version (BCD).
    pub minor: u8,
    /// Firmware property word.
    pub props: HwProps,
    /// Highest bus number the firmware reports.
    pub last_bus: u8,
}

/// The PCI discovery component.
///
/// Constructing it runs the one-time preconditions; enumeration can
/// then be repeated at will.
pub struct Pci {
    info: HwInfo,
}

impl Pci {
    /// Validates the firmware report and readies the enumerator.
    ///
    /// No configuration-space access happens here (or ever, when the
    /// checks fail).
    ///
    /// # Errors
    ///
    /// [`PciError::UnsupportedVersion`] when major and minor are both
    /// zero; [`PciError::UnsupportedMechanism`] when the mechanism-1
    /// flag is clear.
    pub fn init(info: HwInfo) -> Result<Self, PciError> {
        if info.major == 0 && info.minor == 0 {
            muon_loader::lerr!("pci: not supported");
            return Err(PciError::UnsupportedVersion);
        }
        if !info.props.contains(HwProps::MECHANISM_1) {
            muon_loader::lerr!("pci: configuration mechanism 1 unavailable");
            return Err(PciError::UnsupportedMechanism);
        }
        muon_loader::linfo!(
            "pci: version {:x}.{:02x}, last bus {}",
            info.major,
            info.minor,
            info.last_bus
        );
        Ok(Self { info })
    }

    /// Returns the firmware-reported `(major, minor)` version pair.
    #[must_use]
    pub fn version(&self) -> (u8, u8) {
        (self.info.major, self.info.minor)
    }

    /// Returns the firmware-reported highest bus number.
    #[must_use]
    pub fn last_bus(&self) -> u8 {
        self.info.last_bus
    }

    /// Walks the bus tree and reports every device to `visitor`.
    ///
    /// Starts from bus 0, recursing through PCI-to-PCI bridges. The
    /// visitor is invoked synchronously and must not block; device
    /// records are only valid for the duration of the call.
    ///
    /// # Errors
    ///
    /// [`PciError::UnsupportedTopology`] when the root bus turns out to
    /// be multi-function; nothing is reported in that case.
    pub fn enumerate(
        &self,
        access: &impl ConfigAccess,
        visitor: &mut impl DeviceVisitor,
    ) -> Result<(), PciError> {
        enumerate::enumerate_root(access, visitor)
    }
}
