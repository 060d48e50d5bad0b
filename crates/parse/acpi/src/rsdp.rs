//! Root System Description Pointer (RSDP) location and validation.
//!
//! The firmware places the RSDP on a 16-byte boundary somewhere in the
//! BIOS ROM window `0xE0000..0x100000` (it can also live in the EBDA,
//! which the loader does not map and therefore does not scan). Locating
//! it means walking the window in 16-byte steps, comparing signatures,
//! and checksumming each candidate.

use crate::sdt::{read_array, read_u32, validate_checksum};
use crate::{AcpiError, AcpiHandler};

/// The 8-byte RSDP signature, including the trailing space.
pub const RSDP_SIGNATURE: [u8; 8] = *b"RSD PTR ";

/// First byte of the firmware window scanned for the RSDP.
pub const SCAN_START: u32 = 0xE0000;

/// One past the last byte of the scan window.
pub const SCAN_END: u32 = 0x10_0000;

/// RSDP candidates are aligned to 16 bytes.
const SCAN_STEP: u32 = 16;

/// Root System Description Pointer (ACPI 1.0 layout, 20 bytes).
///
/// The revision 2+ extension (XSDT address, extended checksum) is not
/// read; a 32-bit loader follows the RSDT in either case.
#[derive(Debug, Clone, Copy)]
pub struct Rsdp {
    checksum: u8,
    oem_id: [u8; 6],
    revision: u8,
    rsdt_addr: u32,
}

impl Rsdp {
    /// Size of the checksummed ACPI 1.0 structure in bytes.
    pub const SIZE: usize = 20;

    /// Read an [`Rsdp`] from a byte slice.
    ///
    /// Checks the signature but not the checksum; callers validate the
    /// checksum over the raw bytes first.
    #[must_use]
    pub fn read_from_bytes(data: &[u8]) -> Option<Self> {
        if read_array::<8>(data, 0)? != RSDP_SIGNATURE {
            return None;
        }
        Some(Self {
            checksum: *data.get(8)?,
            oem_id: read_array::<6>(data, 9)?,
            revision: *data.get(15)?,
            rsdt_addr: read_u32(data, 16)?,
        })
    }

    /// Returns the checksum byte.
    #[must_use]
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Returns the OEM identification string.
    #[must_use]
    pub fn oem_id(&self) -> [u8; 6] {
        self.oem_id
    }

    /// Returns the ACPI revision (0 = 1.0, 2 = 2.0+).
    #[must_use]
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Returns the physical address of the RSDT.
    #[must_use]
    pub fn rsdt_addr(&self) -> u32 {
        self.rsdt_addr
    }
}

/// Scan the firmware ROM window for a valid RSDP.
///
/// Walks `SCAN_START..SCAN_END` in 16-byte steps. Each step does a
/// cheap first-byte test before the full 8-byte signature compare, then
/// checksums the fixed-size structure. The first candidate that passes
/// both terminates the scan; a candidate whose checksum fails is
/// skipped and the scan continues.
///
/// # Errors
///
/// Returns [`AcpiError::NotFound`] when the window is exhausted.
pub fn find_rsdp(handler: &impl AcpiHandler) -> Result<(u32, Rsdp), AcpiError> {
    let mut phys = SCAN_START;
    // A candidate only counts if the fixed structure fits in the window.
    while phys + Rsdp::SIZE as u32 <= SCAN_END {
        // SAFETY: the scan window is identity-mapped firmware ROM,
        // readable for the whole loader lifetime.
        let candidate = unsafe { handler.map_physical_region(phys, Rsdp::SIZE) };

        if candidate.first() == Some(&b'R')
            && candidate.get(..8) == Some(&RSDP_SIGNATURE[..])
            && candidate.get(..Rsdp::SIZE).is_some_and(validate_checksum)
        {
            let rsdp = Rsdp::read_from_bytes(candidate).ok_or(AcpiError::TruncatedData)?;
            return Ok((phys, rsdp));
        }

        phys += SCAN_STEP;
    }
    Err(AcpiError::NotFound)
}
