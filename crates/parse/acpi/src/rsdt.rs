//! Root System Description Table (RSDT) walking.
//!
//! The RSDT is a standard SDT whose body is a packed array of 32-bit
//! physical pointers to further tables. The loader only reads each
//! pointee's signature; interpreting table bodies is a later stage's
//! job.

use crate::sdt::{SdtHeader, Signature, read_array, read_u32};
use crate::{AcpiError, AcpiHandler};

/// Expected signature of the root table.
pub const RSDT_SIGNATURE: [u8; 4] = *b"RSDT";

/// Size in bytes of a single table-pointer entry.
const ENTRY_SIZE: usize = 4;

/// Iterator over the 32-bit table pointers in an RSDT body.
pub struct TablePointerIter<'a> {
    /// Byte slice covering the entry array.
    data: &'a [u8],
    /// Current offset (in bytes) from the start of `data`.
    offset: usize,
}

impl Iterator for TablePointerIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = read_u32(self.data, self.offset)?;
        self.offset += ENTRY_SIZE;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len().saturating_sub(self.offset) / ENTRY_SIZE;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TablePointerIter<'_> {}

/// The root table with its header parsed and its entry array mapped.
pub struct RootTable {
    header: SdtHeader,
    entries: &'static [u8],
}

impl RootTable {
    /// Map and parse the RSDT at the given physical address.
    ///
    /// Verifies the `RSDT` signature; the declared length bounds the
    /// entry array. The entry count is `(length - header size) / 4`.
    ///
    /// # Errors
    ///
    /// Returns [`AcpiError::TruncatedData`] if the header cannot be
    /// read, or [`AcpiError::InvalidSignature`] on a signature mismatch.
    pub fn load(handler: &impl AcpiHandler, phys: u32) -> Result<Self, AcpiError> {
        // SAFETY: phys comes from a validated RSDP.
        let header_data = unsafe { handler.map_physical_region(phys, SdtHeader::SIZE) };
        let header = SdtHeader::read_from_bytes(header_data).ok_or(AcpiError::TruncatedData)?;

        if header.signature() != Signature(RSDT_SIGNATURE) {
            return Err(AcpiError::InvalidSignature);
        }

        let total_len = header.length() as usize;
        let entries_len = total_len.saturating_sub(SdtHeader::SIZE);

        // SAFETY: phys is valid, total_len comes from the table header.
        let table_data = unsafe { handler.map_physical_region(phys, total_len) };
        let entries = table_data
            .get(SdtHeader::SIZE..SdtHeader::SIZE + entries_len)
            .ok_or(AcpiError::TruncatedData)?;

        Ok(Self { header, entries })
    }

    /// Returns the parsed RSDT header.
    #[must_use]
    pub fn header(&self) -> &SdtHeader {
        &self.header
    }

    /// Returns the number of table pointers the RSDT declares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() / ENTRY_SIZE
    }

    /// Returns `true` if the RSDT declares no table pointers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() < ENTRY_SIZE
    }

    /// Returns an iterator over the table-pointer entries.
    pub fn entries(&self) -> TablePointerIter<'_> {
        TablePointerIter {
            data: self.entries,
            offset: 0,
        }
    }
}

/// Read the 4-byte signature of the table at `phys`.
///
/// Returns `None` if the mapped slice is too short.
#[must_use]
pub fn table_signature(handler: &impl AcpiHandler, phys: u32) -> Option<Signature> {
    // SAFETY: phys comes from an RSDT entry; only the signature bytes
    // are read.
    let data = unsafe { handler.map_physical_region(phys, 4) };
    read_array::<4>(data, 0).map(Signature)
}
