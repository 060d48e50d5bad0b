//! ISA Plug and Play discovery driver.
//!
//! Sits on top of [`muon_pnp`]: locates the `$PnP` installation
//! structure, materializes the 16-bit code/data descriptors its
//! protected-mode entry needs, and queries the firmware for its
//! device-node inventory through the far-call bridge.

use muon_pnp::{Installation, PnpHandler, find_installation};

use crate::arch::x86::far16::{BridgeError, Far16Call, FarPtr};
use crate::arch::x86::gdt::{self, DescriptorTable, Entry, Selector};
use crate::{ldebug, linfo};

/// Sentinel seeded into the node-count output buffer.
const NODE_COUNT_SENTINEL: u8 = 0xEA;

/// Sentinel seeded into the node-size output buffer.
const NODE_SIZE_SENTINEL: u16 = 0xDEAD;

/// PnP BIOS function: get number of device nodes.
const FN_GET_NUM_NODES: u16 = 0;

/// Discovery progress, reported to the boot sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpStatus {
    /// The ROM window holds no valid installation structure.
    NotFound,
    /// A structure was found and checksummed, but no entry descriptors
    /// exist yet.
    Validated,
    /// The 16-bit entry is callable.
    EntryReady,
}

/// Errors from the enumeration query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsaError {
    /// [`IsaPnp::discover`] has not (successfully) run.
    EntryNotReady,
    /// An output buffer lies above the far-pointer horizon.
    OffsetOutOfRange,
    /// The firmware returned a nonzero result code.
    BridgeCallFailed(u16),
    /// The firmware reported success but never wrote the outputs.
    NoResponse,
}

impl From<BridgeError> for IsaError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::OffsetOutOfRange => Self::OffsetOutOfRange,
        }
    }
}

impl core::fmt::Display for IsaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EntryNotReady => f.write_str("entry point not ready"),
            Self::OffsetOutOfRange => f.write_str("output buffer above 64 KiB"),
            Self::BridgeCallFailed(code) => write!(f, "firmware returned {code:#06x}"),
            Self::NoResponse => f.write_str("firmware wrote no outputs"),
        }
    }
}

/// Result of the device-node inventory query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSummary {
    /// Number of device nodes the firmware maintains.
    pub nodes: u8,
    /// Size in bytes of the largest device node.
    pub node_size: u16,
}

/// The ISA PnP discovery component.
///
/// Owns the resolved entry state instead of parking it in globals, so
/// the boot sequencer decides how long it lives and tests can run many
/// instances side by side.
pub struct IsaPnp {
    status: PnpStatus,
    install_addr: u32,
    installation: Option<Installation>,
    entry: Option<FarPtr>,
    data_selector: Option<Selector>,
}

impl IsaPnp {
    /// Creates an idle component; nothing is discovered yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: PnpStatus::NotFound,
            install_addr: 0,
            installation: None,
            entry: None,
            data_selector: None,
        }
    }

    /// Returns the current discovery status.
    #[must_use]
    pub fn status(&self) -> PnpStatus {
        self.status
    }

    /// Returns the physical address of the installation structure, once
    /// one has been validated.
    #[must_use]
    pub fn install_addr(&self) -> Option<u32> {
        self.installation.as_ref().map(|_| self.install_addr)
    }

    /// Returns the validated installation structure.
    #[must_use]
    pub fn installation(&self) -> Option<&Installation> {
        self.installation.as_ref()
    }

    /// Returns the callable protected-mode entry point.
    #[must_use]
    pub fn entry(&self) -> Option<FarPtr> {
        self.entry
    }

    /// Scans the firmware ROM and, on success, sets up the 16-bit entry.
    ///
    /// Allocates a code and a data selector, records 16-bit
    /// byte-granular descriptors based at the structure's declared
    /// protected-mode segment bases, and reloads the table. The
    /// returned status is also kept for later queries.
    pub fn discover(
        &mut self,
        handler: &impl PnpHandler,
        table: &mut DescriptorTable,
    ) -> PnpStatus {
        let Some((phys, install)) = find_installation(handler) else {
            linfo!("isa: no $PnP installation structure");
            self.status = PnpStatus::NotFound;
            return self.status;
        };

        linfo!("isa: $PnP structure at {phys:#07x}, version {:#04x}", install.version());
        self.install_addr = phys;
        self.installation = Some(install);
        self.status = PnpStatus::Validated;

        self.setup_entry(table, &install);
        self.status = PnpStatus::EntryReady;
        self.status
    }

    /// Builds the entry descriptors for a validated structure.
    fn setup_entry(&mut self, table: &mut DescriptorTable, install: &Installation) {
        let code_selector = table.push();
        let data_selector = table.push();

        // 16-bit, byte-granular segments over the firmware's declared
        // protected-mode bases.
        let flags = gdt::flags_nibble(false, false, false);
        let code_access = gdt::access_byte(true, 0, true, true, false, true, false);
        let data_access = gdt::access_byte(true, 0, true, false, false, true, false);
        table.record(
            code_selector,
            Entry::new(install.prot_code_base(), 0xF_FFFF, code_access, flags),
        );
        table.record(
            data_selector,
            Entry::new(install.prot_data_base(), 0xF_FFFF, data_access, flags),
        );

        #[cfg(target_arch = "x86")]
        // SAFETY: both freshly pushed slots were recorded above.
        unsafe {
            table.reload();
        }

        let entry = FarPtr::new(code_selector.0, install.prot_entry_offset());
        ldebug!(
            "isa: entry {entry}, code base {:#x}, data base {:#x}",
            install.prot_code_base(),
            install.prot_data_base()
        );
        self.entry = Some(entry);
        self.data_selector = Some(data_selector);
    }

    /// Queries the firmware for its device-node count and size.
    ///
    /// Issues the six-word "get number of device nodes" call through
    /// the bridge, with both outputs delivered through far pointers into
    /// loader memory. A nonzero result code or untouched outputs are
    /// reported as errors, not retried.
    ///
    /// # Errors
    ///
    /// [`IsaError::EntryNotReady`] before a successful
    /// [`discover`](Self::discover); [`IsaError::OffsetOutOfRange`] if
    /// an output buffer cannot be expressed as a far pointer;
    /// [`IsaError::BridgeCallFailed`] / [`IsaError::NoResponse`] on
    /// firmware failure.
    pub fn device_node_summary(
        &self,
        caller: &mut impl Far16Call,
    ) -> Result<NodeSummary, IsaError> {
        let entry = self.entry.ok_or(IsaError::EntryNotReady)?;
        let data_selector = self.data_selector.ok_or(IsaError::EntryNotReady)?;

        let mut nodes: u8 = NODE_COUNT_SENTINEL;
        let mut node_size: u16 = NODE_SIZE_SENTINEL;
        let nodes_ptr = output_ptr((&raw mut nodes).addr())?;
        let size_ptr = output_ptr((&raw mut node_size).addr())?;

        let args = node_query_args(nodes_ptr, size_ptr, data_selector.0);
        let result = caller.call_far16(entry, &args);

        // The firmware wrote through the aliasing data selector, not
        // through these locals; force fresh reads.
        let nodes = unsafe { core::ptr::read_volatile(&raw const nodes) };
        let node_size = unsafe { core::ptr::read_volatile(&raw const node_size) };
        interpret_outputs(result, nodes, node_size)
    }
}

impl Default for IsaPnp {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a buffer address into an output far pointer.
fn output_ptr(addr: usize) -> Result<FarPtr, IsaError> {
    let addr = u32::try_from(addr).map_err(|_| IsaError::OffsetOutOfRange)?;
    Ok(FarPtr::data(addr)?)
}

/// The fixed six-word argument layout of the node-count query.
fn node_query_args(count_ptr: FarPtr, size_ptr: FarPtr, data_segment: u16) -> [u16; 6] {
    [
        FN_GET_NUM_NODES,
        count_ptr.offset,
        count_ptr.segment,
        size_ptr.offset,
        size_ptr.segment,
        data_segment,
    ]
}

/// Folds the result code and output buffers into a summary.
fn interpret_outputs(result: u16, nodes: u8, node_size: u16) -> Result<NodeSummary, IsaError> {
    if result != 0 {
        return Err(IsaError::BridgeCallFailed(result));
    }
    if nodes == NODE_COUNT_SENTINEL && node_size == NODE_SIZE_SENTINEL {
        return Err(IsaError::NoResponse);
    }
    Ok(NodeSummary { nodes, node_size })
}
