//! ACPI discovery driver.
//!
//! Thin glue over [`muon_acpi`]: finds the root pointer, walks the
//! RSDT, and condenses what the firmware advertises into a summary the
//! boot sequencer can log and hand to the kernel.

use muon_acpi::rsdt::table_signature;
use muon_acpi::{AcpiError, AcpiHandler, RootTable, Signature, rsdp};
use planck_noalloc::vec::ArrayVec;

use crate::linfo;

/// Maximum number of table signatures kept in a summary.
pub const MAX_SIGNATURES: usize = 32;

/// What ACPI discovery learned, for logging and hand-over.
pub struct AcpiSummary {
    /// Physical address of the validated RSDP.
    pub rsdp_addr: u32,
    /// ACPI revision from the RSDP (0 = 1.0, 2 = 2.0+).
    pub revision: u8,
    /// OEM identifier from the RSDP.
    pub oem_id: [u8; 6],
    /// Number of table pointers the RSDT declares.
    pub table_count: usize,
    signatures: ArrayVec<Signature, MAX_SIGNATURES>,
}

impl AcpiSummary {
    /// Returns the collected table signatures (truncated to
    /// [`MAX_SIGNATURES`] on pathological firmware).
    #[must_use]
    pub fn signatures(&self) -> &[Signature] {
        self.signatures.as_slice()
    }
}

/// Runs ACPI discovery: locate, validate, walk, summarize.
///
/// # Errors
///
/// Propagates [`AcpiError::NotFound`] when no valid root pointer exists
/// in the ROM window, and the root-table errors from
/// [`RootTable::load`].
pub fn discover(handler: &impl AcpiHandler) -> Result<AcpiSummary, AcpiError> {
    let (rsdp_addr, rsdp) = rsdp::find_rsdp(handler)?;
    linfo!(
        "acpi: RSDP at {rsdp_addr:#07x}, revision {}",
        rsdp.revision()
    );

    let root = RootTable::load(handler, rsdp.rsdt_addr())?;
    linfo!(
        "acpi: RSDT at {:#07x}, {} tables",
        rsdp.rsdt_addr(),
        root.len()
    );

    let mut signatures = ArrayVec::new();
    for phys in root.entries() {
        let Some(signature) = table_signature(handler, phys) else {
            continue;
        };
        linfo!("acpi: table {signature} at {phys:#07x}");
        if !signatures.is_full() {
            signatures.push(signature);
        }
    }

    Ok(AcpiSummary {
        rsdp_addr,
        revision: rsdp.revision(),
        oem_id: rsdp.oem_id(),
        table_count: root.len(),
        signatures,
    })
}
