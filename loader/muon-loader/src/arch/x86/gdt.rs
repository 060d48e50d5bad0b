//! Segment descriptor table management.
//!
//! The 16-bit stage reserves a small region in low memory for the
//! descriptor table and its live pointer record, installs the flat
//! code/data descriptors, and loads it before switching to protected
//! mode. This module takes ownership of that region in 32-bit code:
//! discovery drivers append descriptors for firmware segments (the ISA
//! PnP 16-bit entry needs two), record them, and reload the table.
//!
//! Every allocated slot must be recorded before [`DescriptorTable::reload`];
//! the processor faults on the first access through a half-written
//! descriptor, and there is nothing underneath the loader to catch it.

/// Fixed physical address of the live table pointer record.
pub const TABLE_POINTER_ADDR: u32 = 0x502;

/// Fixed physical address of the first descriptor slot.
pub const TABLE_BASE_ADDR: u32 = 0x508;

/// Flat 32-bit code segment installed by the previous stage.
pub const FLAT_CODE_SELECTOR: Selector = Selector(0x08);

/// Flat 32-bit data segment installed by the previous stage.
pub const FLAT_DATA_SELECTOR: Selector = Selector(0x10);

/// A selector: the byte offset of one descriptor slot in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Selector(pub u16);

impl Selector {
    /// Returns the descriptor index (offset / 8).
    #[must_use]
    pub const fn index(self) -> u16 {
        self.0 >> 3
    }
}

/// The live length/base record the `lgdt` instruction reads.
///
/// The length is kept a multiple of 8 and always equals the end offset
/// of the highest allocated slot.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct TablePointer {
    /// Table length in bytes.
    pub length: u16,
    /// Linear base address of the first slot.
    pub base: u32,
}

/// One 8-byte segment descriptor.
///
/// The encoding is read directly by the processor, so the byte layout
/// is reproduced bit for bit: a 20-bit limit and 32-bit base scattered
/// across split fields, the access byte, and the flag nibble packed
/// into the high half of the third limit byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u64);

impl Entry {
    /// Composes a descriptor from its parts.
    ///
    /// `limit` is truncated to 20 bits and `flags` to the low nibble.
    #[must_use]
    pub const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        let limit = limit & 0xF_FFFF;
        let mut raw = (limit as u64) & 0xFFFF; // limit bytes 0-1
        raw |= ((base as u64) & 0xFF_FFFF) << 16; // base bytes 2-4
        raw |= (access as u64) << 40; // access byte 5
        raw |= ((limit as u64) >> 16) << 48; // limit nibble, byte 6 low
        raw |= ((flags as u64) & 0x0F) << 52; // flag nibble, byte 6 high
        raw |= ((base as u64) >> 24) << 56; // base byte 7
        Self(raw)
    }

    /// Wraps a raw 8-byte descriptor value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 8-byte value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Decomposes the 32-bit base.
    #[must_use]
    pub const fn base(self) -> u32 {
        (((self.0 >> 16) & 0xFF_FFFF) | ((self.0 >> 56) << 24)) as u32
    }

    /// Decomposes the 20-bit limit.
    #[must_use]
    pub const fn limit(self) -> u32 {
        ((self.0 & 0xFFFF) | (((self.0 >> 48) & 0x0F) << 16)) as u32
    }

    /// Decomposes the access byte.
    #[must_use]
    pub const fn access(self) -> u8 {
        (self.0 >> 40) as u8
    }

    /// Decomposes the flag nibble.
    #[must_use]
    pub const fn flags(self) -> u8 {
        ((self.0 >> 52) & 0x0F) as u8
    }
}

/// Composes a descriptor access byte from its attributes.
///
/// `dpl` is the 2-bit privilege level; `non_system` selects a code/data
/// descriptor over a system descriptor; `direction_conforming` is the
/// direction bit for data and the conforming bit for code.
#[must_use]
pub const fn access_byte(
    present: bool,
    dpl: u8,
    non_system: bool,
    executable: bool,
    direction_conforming: bool,
    writable: bool,
    accessed: bool,
) -> u8 {
    ((present as u8) << 7)
        | ((dpl & 0b11) << 5)
        | ((non_system as u8) << 4)
        | ((executable as u8) << 3)
        | ((direction_conforming as u8) << 2)
        | ((writable as u8) << 1)
        | (accessed as u8)
}

/// Composes the descriptor flag nibble.
///
/// `granularity` scales the limit by 4 KiB, `size32` selects 32-bit
/// operands, `long_mode` marks a 64-bit code segment. A 16-bit
/// byte-granular segment is all three false.
#[must_use]
pub const fn flags_nibble(granularity: bool, size32: bool, long_mode: bool) -> u8 {
    ((granularity as u8) << 3) | ((size32 as u8) << 2) | ((long_mode as u8) << 1)
}

/// Handle over the descriptor table region.
///
/// Appends and records descriptors through raw pointers so the same
/// code drives the real table at its fixed boot location and a
/// synthetic buffer in host tests.
pub struct DescriptorTable {
    pointer: *mut TablePointer,
    base: *mut u8,
}

impl DescriptorTable {
    /// Creates a handle over an arbitrary pointer record and slot base.
    ///
    /// # Safety
    ///
    /// `pointer` must reference a valid [`TablePointer`] and `base` the
    /// first byte of the slot region it describes; both must stay valid
    /// and exclusively owned by this handle for its whole lifetime.
    #[must_use]
    pub const unsafe fn from_raw(pointer: *mut TablePointer, base: *mut u8) -> Self {
        Self { pointer, base }
    }

    /// Creates the handle over the fixed boot-time table location.
    ///
    /// # Safety
    ///
    /// Must be called at most once, after the previous stage has
    /// initialized the record at [`TABLE_POINTER_ADDR`].
    #[must_use]
    pub unsafe fn at_boot_location() -> Self {
        // SAFETY: the fixed low-memory region is reserved for the table.
        unsafe {
            Self::from_raw(
                TABLE_POINTER_ADDR as usize as *mut TablePointer,
                TABLE_BASE_ADDR as usize as *mut u8,
            )
        }
    }

    /// Returns the current table length in bytes.
    #[must_use]
    pub fn len(&self) -> u16 {
        // SAFETY: `pointer` is valid per the construction contract.
        unsafe { (*self.pointer).length }
    }

    /// Returns `true` if no slot is allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates the next 8-byte slot and returns its selector.
    ///
    /// The new slot is zero-filled and must be written with
    /// [`record`](Self::record) before the next [`reload`](Self::reload).
    /// There is no capacity check: the caller must not exceed the
    /// region reserved for the table, or adjacent memory is corrupted.
    pub fn push(&mut self) -> Selector {
        // SAFETY: `pointer` and `base` are valid per the construction
        // contract; the new slot lies within the reserved region.
        unsafe {
            let length = (*self.pointer).length;
            let slot = self.base.add(usize::from(length)).cast::<u64>();
            slot.write_unaligned(0);
            let record = &raw mut (*self.pointer).length;
            record.write_unaligned(length + 8);
            Selector(length)
        }
    }

    /// Writes a descriptor into a previously allocated slot.
    ///
    /// The processor keeps using its cached copy until the next
    /// [`reload`](Self::reload).
    pub fn record(&mut self, selector: Selector, entry: Entry) {
        // SAFETY: `selector` came from `push`, so the slot is inside
        // the reserved region.
        unsafe {
            let slot = self.base.add(usize::from(selector.0)).cast::<u64>();
            slot.write_unaligned(entry.as_u64());
        }
    }

    /// Reloads the table from its pointer record, activating every
    /// recorded descriptor.
    ///
    /// # Safety
    ///
    /// Every slot allocated since the last reload must have been
    /// recorded; activating a table with an unwritten slot faults on
    /// first use. Segment registers holding stale selectors must be
    /// reloaded by the caller.
    #[cfg(target_arch = "x86")]
    pub unsafe fn reload(&self) {
        // SAFETY: the record is valid per the construction contract.
        unsafe {
            core::arch::asm!(
                "lgdt [{0:e}]",
                in(reg) self.pointer,
                options(readonly, nostack, preserves_flags),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A synthetic table region: pointer record + 16 slots.
    struct TestTable {
        record: Box<TablePointer>,
        slots: Box<[u8; 128]>,
    }

    impl TestTable {
        fn new(initial_len: u16) -> Self {
            let mut slots = Box::new([0u8; 128]);
            let record = Box::new(TablePointer {
                length: initial_len,
                base: slots.as_mut_ptr() as usize as u32,
            });
            Self { record, slots }
        }

        fn handle(&mut self) -> DescriptorTable {
            // SAFETY: record and slots outlive the handle in each test.
            unsafe {
                DescriptorTable::from_raw(
                    core::ptr::from_mut(self.record.as_mut()),
                    self.slots.as_mut_ptr(),
                )
            }
        }

        fn slot(&self, selector: Selector) -> u64 {
            let off = usize::from(selector.0);
            u64::from_le_bytes(self.slots[off..off + 8].try_into().unwrap())
        }
    }

    #[test]
    fn push_returns_distinct_increasing_selectors() {
        let mut table = TestTable::new(24);
        let mut handle = table.handle();

        let selectors: Vec<Selector> = (0..4).map(|_| handle.push()).collect();
        assert_eq!(
            selectors,
            vec![Selector(24), Selector(32), Selector(40), Selector(48)]
        );
        for selector in &selectors {
            assert_eq!(selector.0 % 8, 0);
        }
        assert_eq!(handle.len(), 24 + 8 * 4);
    }

    #[test]
    fn push_zero_fills_the_new_slot() {
        let mut table = TestTable::new(0);
        table.slots[0..8].copy_from_slice(&[0xAA; 8]);
        let mut handle = table.handle();

        let selector = handle.push();
        assert_eq!(table.slot(selector), 0);
    }

    #[test]
    fn record_writes_at_selector_offset() {
        let mut table = TestTable::new(16);
        let mut handle = table.handle();

        let selector = handle.push();
        let entry = Entry::new(0xF_0000, 0xFFFF, 0x9A, 0);
        handle.record(selector, entry);

        assert_eq!(table.slot(Selector(16)), entry.as_u64());
    }

    #[test]
    fn entry_video_segment_bit_pattern() {
        // Text-mode video segment: base 0xB8000, full 20-bit limit,
        // present ring-0 code, page granularity.
        let entry = Entry::new(0xB8000, 0xF_FFFF, 0x9A, 0b1000);
        assert_eq!(entry.as_u64(), 0x008F_9A0B_8000_FFFF);
    }

    #[test]
    fn entry_round_trips() {
        let entry = Entry::new(0xB8000, 0xF_FFFF, 0x9A, 0b1000);
        assert_eq!(entry.base(), 0xB8000);
        assert_eq!(entry.limit(), 0xF_FFFF);
        assert_eq!(entry.access(), 0x9A);
        assert_eq!(entry.flags(), 0b1000);

        let entry = Entry::new(0xFFFF_FFFF, 0x1_2345, 0x92, 0b0100);
        assert_eq!(entry.base(), 0xFFFF_FFFF);
        assert_eq!(entry.limit(), 0x1_2345);
        assert_eq!(entry.access(), 0x92);
        assert_eq!(entry.flags(), 0b0100);
    }

    #[test]
    fn entry_truncates_oversized_limit_and_flags() {
        let entry = Entry::new(0, 0xFFFF_FFFF, 0, 0xFF);
        assert_eq!(entry.limit(), 0xF_FFFF);
        assert_eq!(entry.flags(), 0x0F);
    }

    #[test]
    fn access_byte_composition() {
        // Present ring-0 code, readable: the classic 0x9A.
        assert_eq!(access_byte(true, 0, true, true, false, true, false), 0x9A);
        // Present ring-0 data, writable: 0x92.
        assert_eq!(access_byte(true, 0, true, false, false, true, false), 0x92);
        // Present ring-3 data, writable: 0xF2.
        assert_eq!(access_byte(true, 3, true, false, false, true, false), 0xF2);
        // DPL is masked to two bits.
        assert_eq!(
            access_byte(false, 0xFF, false, false, false, false, false),
            0b0110_0000
        );
    }

    #[test]
    fn flags_nibble_composition() {
        assert_eq!(flags_nibble(false, false, false), 0b0000);
        assert_eq!(flags_nibble(true, false, false), 0b1000);
        assert_eq!(flags_nibble(true, true, false), 0b1100);
        assert_eq!(flags_nibble(false, false, true), 0b0010);
    }

    #[test]
    fn selector_index() {
        assert_eq!(FLAT_CODE_SELECTOR.index(), 1);
        assert_eq!(FLAT_DATA_SELECTOR.index(), 2);
        assert_eq!(Selector(40).index(), 5);
    }
}
