//! Far-call bridge from 32-bit code into 16-bit firmware routines.
//!
//! The PnP BIOS protected-mode entry is 16-bit code. Calling it from
//! 32-bit code means copying the word-sized arguments onto the stack,
//! faking the far-return frame the callee's `retf` expects, and
//! far-calling through a 16-bit code descriptor. The callee returns its
//! result in `ax` and leaves the caller to discard the argument region.
//!
//! Output parameters travel as far pointers built against the flat data
//! segment, so they can only address the low 64 KiB. That boundary is a
//! structural property of the bridge; [`FarPtr::data`] refuses
//! addresses above it instead of truncating them.

use super::gdt;

/// A 16-bit far pointer: segment (or selector) plus offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarPtr {
    /// Segment selector, or a real-mode segment value.
    pub segment: u16,
    /// Offset within the segment; reaches at most 64 KiB.
    pub offset: u16,
}

impl FarPtr {
    /// Creates a far pointer from its parts.
    #[must_use]
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    /// Builds an output-parameter far pointer to a linear address,
    /// aliased through the flat data selector.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::OffsetOutOfRange`] when `addr` lies above
    /// the 64 KiB the 16-bit callee can address through the selector.
    pub const fn data(addr: u32) -> Result<Self, BridgeError> {
        if addr > u16::MAX as u32 {
            return Err(BridgeError::OffsetOutOfRange);
        }
        Ok(Self {
            segment: gdt::FLAT_DATA_SELECTOR.0,
            offset: addr as u16,
        })
    }
}

impl core::fmt::Display for FarPtr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.segment, self.offset)
    }
}

/// Errors raised while marshaling a bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// An output parameter lies above the 64 KiB far-pointer horizon.
    OffsetOutOfRange,
}

impl core::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OffsetOutOfRange => f.write_str("output parameter above 64 KiB"),
        }
    }
}

/// The far-call capability.
///
/// Takes `&mut self` because only one bridge call can be in flight at a
/// time: the trampoline reuses the single loader stack. Host tests
/// substitute a scripted callee.
pub trait Far16Call {
    /// Calls `target` with the given 16-bit word arguments and returns
    /// the callee's `ax`.
    ///
    /// Callers interpret zero as success and any nonzero value as a
    /// callee-defined error code.
    fn call_far16(&mut self, target: FarPtr, args: &[u16]) -> u16;
}

/// The real trampoline.
#[cfg(target_arch = "x86")]
pub struct Trampoline;

#[cfg(target_arch = "x86")]
impl Far16Call for Trampoline {
    fn call_far16(&mut self, target: FarPtr, args: &[u16]) -> u16 {
        let arg_bytes = args.len() as u32 * 2;
        let raw_result: u32;
        // SAFETY: the reserved argument region is released before the
        // asm block ends, the far-return frame lands on the local
        // continuation label, and the callee follows the PnP BIOS
        // convention of preserving everything but `ax` (so `ebx` still
        // holds the argument size afterwards).
        unsafe {
            core::arch::asm!(
                // Reserve the argument region and copy the words over.
                // `rep movsw` leaves edi free for the label below.
                "sub esp, ebx",
                "mov edi, esp",
                "rep movsw",
                // Synthetic far-return frame: the 16-bit callee's retf
                // pops a 16-bit offset and segment, landing at 2: below.
                "lea edi, [2f]",
                "pushw cs",
                "pushw di",
                // Far call: 32-bit retf consumes offset then segment.
                "push edx",
                "push eax",
                "retf",
                "2:",
                "add esp, ebx",
                inout("eax") u32::from(target.offset) => raw_result,
                in("ebx") arg_bytes,
                inout("ecx") args.len() as u32 => _,
                in("edx") u32::from(target.segment),
                inout("esi") args.as_ptr() => _,
                out("edi") _,
            );
        }
        raw_result as u16
    }
}
