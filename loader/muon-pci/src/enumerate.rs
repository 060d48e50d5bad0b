//! The recursive bus walk.

use crate::PciError;
use crate::access::{ConfigAccess, regs};
use crate::addr::DeviceAddr;
use crate::info::{DeviceInfo, DeviceVisitor};

/// Base class of bridge devices.
const CLASS_BRIDGE: u8 = 0x06;

/// Subclass of PCI-to-PCI bridges.
const SUBCLASS_PCI_TO_PCI: u8 = 0x04;

/// Checks the root bus shape and walks the tree from bus 0.
pub(crate) fn enumerate_root(
    access: &impl ConfigAccess,
    visitor: &mut impl DeviceVisitor,
) -> Result<(), PciError> {
    let root = DeviceAddr::new(0, 0, 0);
    if access.header_type(root) & regs::HEADER_TYPE_MULTIFUNCTION != 0 {
        // Multiple host controllers; deliberately not walked.
        muon_loader::lerr!("pci: multi-function root bus, not enumerating");
        return Err(PciError::UnsupportedTopology);
    }
    walk_bus(access, 0, visitor);
    Ok(())
}

/// Walks the 32 slots of one bus.
fn walk_bus(access: &impl ConfigAccess, bus: u8, visitor: &mut impl DeviceVisitor) {
    for slot in 0..32u8 {
        let primary = DeviceAddr::new(bus, slot, 0);
        if access.vendor_id(primary) == regs::VENDOR_NONE {
            continue; // absent slot
        }

        visit_function(access, primary, visitor);

        if access.header_type(primary) & regs::HEADER_TYPE_MULTIFUNCTION != 0 {
            for function in 1..8u8 {
                let addr = DeviceAddr::new(bus, slot, function);
                if access.vendor_id(addr) == regs::VENDOR_NONE {
                    continue; // absent function, not an error
                }
                visit_function(access, addr, visitor);
            }
        }
    }
}

/// Reports one function, or recurses through it if it bridges to
/// another bus.
fn visit_function(
    access: &impl ConfigAccess,
    addr: DeviceAddr,
    visitor: &mut impl DeviceVisitor,
) {
    let class = access.base_class(addr);
    let subclass = access.subclass(addr);

    if class == CLASS_BRIDGE && subclass == SUBCLASS_PCI_TO_PCI {
        let secondary = access.secondary_bus(addr);
        if secondary != 0 {
            walk_bus(access, secondary, visitor);
        }
        // The bridge itself is plumbing, not a device.
        return;
    }

    let info = DeviceInfo {
        address: addr,
        vendor_id: access.vendor_id(addr),
        device_id: access.device_id(addr),
        class,
        subclass,
    };
    visitor.on_device(&info);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::info::DeviceList;
    use crate::{HwInfo, HwProps, Pci};

    /// A synthetic configuration space: absent registers read all-ones.
    #[derive(Default)]
    struct FakeSpace {
        regs: HashMap<(u32, u8), u32>,
    }

    impl FakeSpace {
        fn set(&mut self, addr: DeviceAddr, offset: u8, value: u32) {
            self.regs.insert((addr.as_u32(), offset & 0xFC), value);
        }

        /// Installs a plain function: vendor/device at 0x00, class
        /// bytes at 0x08, header type at 0x0E.
        fn put_function(
            &mut self,
            addr: DeviceAddr,
            vendor: u16,
            device: u16,
            class: u8,
            subclass: u8,
            multi_function: bool,
        ) {
            self.set(addr, 0x00, (u32::from(device) << 16) | u32::from(vendor));
            self.set(addr, 0x08, (u32::from(class) << 24) | (u32::from(subclass) << 16));
            let header: u32 = if multi_function { 0x80 } else { 0x00 };
            self.set(addr, 0x0C, header << 16);
        }

        /// Installs a PCI-to-PCI bridge leading to `secondary`.
        fn put_bridge(&mut self, addr: DeviceAddr, vendor: u16, secondary: u8) {
            self.put_function(addr, vendor, 0x0001, 0x06, 0x04, false);
            self.set(addr, 0x18, u32::from(secondary) << 8);
        }
    }

    impl ConfigAccess for FakeSpace {
        fn read_u32(&self, addr: DeviceAddr, offset: u8) -> u32 {
            *self
                .regs
                .get(&(addr.as_u32(), offset & 0xFC))
                .unwrap_or(&0xFFFF_FFFF)
        }
    }

    fn pci() -> Pci {
        Pci::init(HwInfo {
            major: 2,
            minor: 0x10,
            props: HwProps::MECHANISM_1,
            last_bus: 1,
        })
        .unwrap()
    }

    #[test]
    fn bridge_is_followed_and_not_reported() {
        // Root function bridges to bus 1; the only real device lives at
        // 01:02.0.
        let mut space = FakeSpace::default();
        space.put_bridge(DeviceAddr::new(0, 0, 0), 0x8086, 1);
        space.put_function(DeviceAddr::new(1, 2, 0), 0x10DE, 0x2206, 0x03, 0x00, false);

        let mut list = DeviceList::<8>::new();
        pci().enumerate(&space, &mut list).unwrap();

        assert_eq!(list.seen(), 1);
        let device = &list.devices()[0];
        assert_eq!(
            (device.address.bus(), device.address.slot(), device.address.function()),
            (1, 2, 0)
        );
        assert_eq!(device.vendor_id, 0x10DE);
        assert_eq!(device.class, 0x03);
        assert_eq!(device.subclass, 0x00);
    }

    #[test]
    fn multi_function_root_is_unsupported() {
        let mut space = FakeSpace::default();
        space.put_function(DeviceAddr::new(0, 0, 0), 0x8086, 0x29C0, 0x06, 0x00, true);

        let mut list = DeviceList::<8>::new();
        assert!(matches!(
            pci().enumerate(&space, &mut list),
            Err(PciError::UnsupportedTopology)
        ));
        assert_eq!(list.seen(), 0);
    }

    #[test]
    fn multi_function_device_reports_present_functions() {
        let mut space = FakeSpace::default();
        space.put_function(DeviceAddr::new(0, 0, 0), 0x8086, 0x29C0, 0x06, 0x00, false);
        // 00:03 carries functions 0, 2 (1 and 3-7 absent).
        space.put_function(DeviceAddr::new(0, 3, 0), 0x8086, 0x2934, 0x0C, 0x03, true);
        space.put_function(DeviceAddr::new(0, 3, 2), 0x8086, 0x2936, 0x0C, 0x03, false);

        let mut list = DeviceList::<8>::new();
        pci().enumerate(&space, &mut list).unwrap();

        let paths: Vec<(u8, u8, u8)> = list
            .devices()
            .iter()
            .map(|d| (d.address.bus(), d.address.slot(), d.address.function()))
            .collect();
        assert_eq!(paths, vec![(0, 0, 0), (0, 3, 0), (0, 3, 2)]);
    }

    #[test]
    fn single_function_device_skips_secondary_functions() {
        let mut space = FakeSpace::default();
        space.put_function(DeviceAddr::new(0, 0, 0), 0x8086, 0x29C0, 0x06, 0x00, false);
        space.put_function(DeviceAddr::new(0, 4, 0), 0x10EC, 0x8139, 0x02, 0x00, false);
        // Garbage parked at function 1 must never be probed into a
        // report because the header says single-function.
        space.put_function(DeviceAddr::new(0, 4, 1), 0x1234, 0x5678, 0x02, 0x00, false);

        let mut list = DeviceList::<8>::new();
        pci().enumerate(&space, &mut list).unwrap();

        assert_eq!(list.seen(), 2);
        assert!(
            list.devices()
                .iter()
                .all(|d| d.address.function() == 0)
        );
    }

    #[test]
    fn absent_root_function_fails_the_shape_check() {
        // Header type of an absent 00:00.0 reads 0xFF: multi-function
        // bit set, so the shape check fires before any slot probe.
        let space = FakeSpace::default();
        let mut list = DeviceList::<8>::new();
        assert!(matches!(
            pci().enumerate(&space, &mut list),
            Err(PciError::UnsupportedTopology)
        ));
    }

    #[test]
    fn bridge_to_bus_zero_is_ignored() {
        // A malformed bridge whose secondary bus is 0 must not recurse
        // the walk into an endless loop.
        let mut space = FakeSpace::default();
        space.put_function(DeviceAddr::new(0, 0, 0), 0x8086, 0x29C0, 0x06, 0x00, false);
        space.put_bridge(DeviceAddr::new(0, 5, 0), 0x8086, 0);

        let mut list = DeviceList::<8>::new();
        pci().enumerate(&space, &mut list).unwrap();
        assert_eq!(list.seen(), 1); // just the host bridge at 00:00.0
    }
}
