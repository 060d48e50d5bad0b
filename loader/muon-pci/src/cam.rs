//! Mechanism-1 configuration access via I/O ports.
//!
//! The classic pair: write the composed address (enable bit, bus,
//! slot, function, dword-aligned offset) to `0xCF8`, read the value
//! from `0xCFC`.

use muon_loader::arch::x86::Port;

use crate::access::ConfigAccess;
use crate::addr::DeviceAddr;

const CONFIG_ADDRESS: u16 = 0x0CF8;
const CONFIG_DATA: u16 = 0x0CFC;

/// Port-backed mechanism-1 access.
pub struct PortCam;

impl PortCam {
    /// Builds the CONFIG_ADDRESS value for a device + register offset.
    #[inline]
    fn make_address(addr: DeviceAddr, offset: u8) -> u32 {
        (1u32 << 31) // enable bit
            | addr.as_u32()
            | (u32::from(offset) & 0xFC) // dword-aligned
    }
}

impl ConfigAccess for PortCam {
    fn read_u32(&self, addr: DeviceAddr, offset: u8) -> u32 {
        let addr_port = Port::<u32>::new(CONFIG_ADDRESS);
        let data_port = Port::<u32>::new(CONFIG_DATA);
        // SAFETY: 0xCF8/0xCFC are the architectural mechanism-1 ports;
        // discovery runs single-threaded, so the address/data pair
        // cannot interleave with another access.
        unsafe {
            addr_port.write(Self::make_address(addr, offset));
            data_port.read()
        }
    }
}
