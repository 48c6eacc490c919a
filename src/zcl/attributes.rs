//! Per-endpoint attribute storage.

use std::collections::HashMap;

use crate::error::AttributeError;

/// A typed attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue {
    U8(u8),
    U16(u16),
}

/// Typed read/write access to ZCL attributes, keyed by endpoint and attribute id.
pub trait AttributeStore {
    /// Reads the raw value, or `None` if the endpoint does not host it.
    fn read(&self, endpoint: u8, attribute: u16) -> Option<AttributeValue>;

    /// Writes a value.
    ///
    /// # Errors
    ///
    /// Implementations reject writes whose type differs from the stored one.
    fn write(
        &mut self,
        endpoint: u8,
        attribute: u16,
        value: AttributeValue,
    ) -> Result<(), AttributeError>;

    /// Reads an 8-bit attribute. A missing attribute or a type mismatch reads as `None`.
    fn read_u8(&self, endpoint: u8, attribute: u16) -> Option<u8> {
        match self.read(endpoint, attribute)? {
            AttributeValue::U8(v) => Some(v),
            AttributeValue::U16(_) => None,
        }
    }

    /// Reads a 16-bit attribute. A missing attribute or a type mismatch reads as `None`.
    fn read_u16(&self, endpoint: u8, attribute: u16) -> Option<u16> {
        match self.read(endpoint, attribute)? {
            AttributeValue::U16(v) => Some(v),
            AttributeValue::U8(_) => None,
        }
    }
}

/// In-memory attribute table.
#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    values: HashMap<(u8, u16), AttributeValue>,
}

impl AttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines (or redefines) an attribute, bypassing the type check of `write`.
    pub fn define(&mut self, endpoint: u8, attribute: u16, value: AttributeValue) {
        self.values.insert((endpoint, attribute), value);
    }

    /// Removes an attribute so later reads fail.
    pub fn undefine(&mut self, endpoint: u8, attribute: u16) {
        self.values.remove(&(endpoint, attribute));
    }
}

impl AttributeStore for AttributeTable {
    fn read(&self, endpoint: u8, attribute: u16) -> Option<AttributeValue> {
        self.values.get(&(endpoint, attribute)).copied()
    }

    fn write(
        &mut self,
        endpoint: u8,
        attribute: u16,
        value: AttributeValue,
    ) -> Result<(), AttributeError> {
        let slot = self
            .values
            .get_mut(&(endpoint, attribute))
            .ok_or(AttributeError::NotFound {
                endpoint,
                attribute,
            })?;
        if std::mem::discriminant(slot) != std::mem::discriminant(&value) {
            return Err(AttributeError::TypeMismatch(attribute));
        }
        *slot = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_reads_reject_mismatched_width() {
        let mut table = AttributeTable::new();
        table.define(1, 0x0003, AttributeValue::U16(0x0FFF));
        assert_eq!(table.read_u16(1, 0x0003), Some(0x0FFF));
        assert_eq!(table.read_u8(1, 0x0003), None);
        assert_eq!(table.read_u16(2, 0x0003), None);
    }

    #[test]
    fn write_requires_existing_attribute_of_same_type() {
        let mut table = AttributeTable::new();
        table.define(1, 0x0000, AttributeValue::U8(0));
        assert!(table.write(1, 0x0000, AttributeValue::U8(5)).is_ok());
        assert_eq!(table.read_u8(1, 0x0000), Some(5));
        assert_eq!(
            table.write(1, 0x0000, AttributeValue::U16(5)),
            Err(AttributeError::TypeMismatch(0x0000))
        );
        assert!(matches!(
            table.write(1, 0x0001, AttributeValue::U8(1)),
            Err(AttributeError::NotFound { .. })
        ));
    }
}
