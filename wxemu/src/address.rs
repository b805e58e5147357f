//! Devices on a multi-drop bus, keyed by address.

use std::collections::BTreeMap;

use crate::{Device, ProtocolError};

/// A sparse map from bus address to device.
///
/// The table owns its devices. Address changes move the device from one key to another inside a
/// single `&mut self` call, so with the table behind one lock no other path can ever observe a
/// device under two addresses or under none.
#[derive(Debug)]
pub struct AddressTable<D> {
    devices: BTreeMap<u8, D>,
    max_address: u8,
}

impl<D: Device> AddressTable<D> {
    /// Create an empty table for addresses `0..=max_address`.
    pub fn new(max_address: u8) -> Self {
        AddressTable {
            devices: BTreeMap::new(),
            max_address,
        }
    }

    /// Create a table holding one device.
    pub fn with_device(max_address: u8, device: D) -> Result<Self, ProtocolError> {
        let mut table = AddressTable::new(max_address);
        table.insert(device)?;
        Ok(table)
    }

    /// The highest valid address.
    pub fn max_address(&self) -> u8 {
        self.max_address
    }

    /// Insert a device under its own address.
    ///
    /// Fails if the address is out of range or already taken.
    pub fn insert(&mut self, device: D) -> Result<(), ProtocolError> {
        let address = device.address();
        if address > self.max_address {
            return Err(ProtocolError::AddressOutOfRange(address.into()));
        }
        if self.devices.contains_key(&address) {
            return Err(ProtocolError::AddressInUse(address));
        }
        self.devices.insert(address, device);
        Ok(())
    }

    /// Get the device at `address`.
    pub fn get(&self, address: u8) -> Option<&D> {
        self.devices.get(&address)
    }

    /// Get the device at `address` mutably.
    pub fn get_mut(&mut self, address: u8) -> Option<&mut D> {
        self.devices.get_mut(&address)
    }

    /// True if a device is present at `address`.
    pub fn contains(&self, address: u8) -> bool {
        self.devices.contains_key(&address)
    }

    /// All occupied addresses in ascending order.
    pub fn addresses(&self) -> Vec<u8> {
        self.devices.keys().copied().collect()
    }

    /// The lowest occupied address.
    pub fn first_address(&self) -> Option<u8> {
        self.devices.keys().next().copied()
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True if there is no device in the table.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate over all devices in address order.
    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.devices.values()
    }

    /// Iterate mutably over all devices in address order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut D> {
        self.devices.values_mut()
    }

    /// Move the device at `old` to `new` and update its address field.
    ///
    /// On error, the table is unchanged.
    ///
    /// # Arguments
    /// * `old`: Current address of the device.
    /// * `new`: New address, must be free and not larger than the maximum address.
    pub fn reassign(&mut self, old: u8, new: u8) -> Result<(), ProtocolError> {
        if new > self.max_address {
            return Err(ProtocolError::AddressOutOfRange(new.into()));
        }
        if !self.devices.contains_key(&old) {
            return Err(ProtocolError::AddressOutOfRange(old.into()));
        }
        if old == new {
            return Ok(());
        }
        if self.devices.contains_key(&new) {
            return Err(ProtocolError::AddressInUse(new));
        }
        if let Some(mut device) = self.devices.remove(&old) {
            device.set_address(new);
            self.devices.insert(new, device);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OutputSchedule, ParsedMessage};
    use rstest::*;

    #[derive(Debug, Default)]
    struct Dummy {
        address: u8,
        schedule: OutputSchedule,
    }

    impl Dummy {
        fn at(address: u8) -> Self {
            Dummy {
                address,
                ..Default::default()
            }
        }
    }

    impl Device for Dummy {
        fn address(&self) -> u8 {
            self.address
        }
        fn set_address(&mut self, address: u8) {
            self.address = address;
        }
        fn schedule(&self) -> &OutputSchedule {
            &self.schedule
        }
        fn schedule_mut(&mut self) -> &mut OutputSchedule {
            &mut self.schedule
        }
        fn ingest(&mut self, _message: &ParsedMessage) {}
    }

    #[fixture]
    fn table() -> AddressTable<Dummy> {
        let mut table = AddressTable::new(98);
        table.insert(Dummy::at(0)).unwrap();
        table.insert(Dummy::at(5)).unwrap();
        table
    }

    #[rstest]
    fn test_reassign_moves_device(mut table: AddressTable<Dummy>) {
        table.reassign(5, 7).unwrap();
        assert!(table.get(5).is_none());
        assert_eq!(table.get(7).unwrap().address(), 7);
        assert_eq!(table.addresses(), vec![0, 7]);
    }

    #[rstest]
    fn test_reassign_out_of_range(mut table: AddressTable<Dummy>) {
        assert_eq!(
            table.reassign(5, 99),
            Err(ProtocolError::AddressOutOfRange(99))
        );
        assert_eq!(table.get(5).unwrap().address(), 5);
    }

    #[rstest]
    fn test_reassign_occupied(mut table: AddressTable<Dummy>) {
        assert_eq!(table.reassign(5, 0), Err(ProtocolError::AddressInUse(0)));
        assert_eq!(table.addresses(), vec![0, 5]);
    }

    #[rstest]
    fn test_reassign_unknown_source(mut table: AddressTable<Dummy>) {
        assert_eq!(
            table.reassign(3, 4),
            Err(ProtocolError::AddressOutOfRange(3))
        );
    }

    #[rstest]
    fn test_reassign_same_address(mut table: AddressTable<Dummy>) {
        table.reassign(5, 5).unwrap();
        assert_eq!(table.addresses(), vec![0, 5]);
    }

    #[rstest]
    fn test_insert_checks(mut table: AddressTable<Dummy>) {
        assert_eq!(
            table.insert(Dummy::at(5)),
            Err(ProtocolError::AddressInUse(5))
        );
        assert_eq!(
            table.insert(Dummy::at(120)),
            Err(ProtocolError::AddressOutOfRange(120))
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.first_address(), Some(0));
    }
}
