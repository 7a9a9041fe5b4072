//! Lvalue accesses produced while lowering expressions.
//!
//! An [`Access`] is a not-yet-materialized memory location: an address base
//! plus a chain of field offsets and index scalings. Reads and writes go
//! through it without computing an address when the whole chain folds to a
//! plain frame slot; otherwise the generator materializes the address into
//! a temporary pointer slot and reads or writes through that.

use coil_ir::{AddressBase, AddressElement, Expression, LocalVarOffset};

#[derive(Debug, Clone)]
pub(crate) struct Access {
    pub(crate) base: AddressBase,
    pub(crate) elements: Vec<AddressElement>,
}

impl Access {
    pub(crate) fn stack(offset: LocalVarOffset) -> Self {
        Self {
            base: AddressBase::Stack(offset),
            elements: Vec::new(),
        }
    }

    pub(crate) fn pointer(slot: LocalVarOffset) -> Self {
        Self {
            base: AddressBase::Pointer(slot),
            elements: Vec::new(),
        }
    }

    #[must_use]
    pub(crate) fn with_element(mut self, element: AddressElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Folds the access to a frame slot if the base is on the stack and
    /// every element is a constant offset.
    pub(crate) fn plain_slot(&self) -> Option<LocalVarOffset> {
        let AddressBase::Stack(LocalVarOffset(base)) = self.base else {
            return None;
        };
        let mut offset = base;
        for element in &self.elements {
            let AddressElement::FieldOffset(field) = element else {
                return None;
            };
            offset = offset.checked_add(*field)?;
        }
        Some(LocalVarOffset(offset))
    }

    /// The slot already holding this access's address, if any.
    pub(crate) fn pointer_slot(&self) -> Option<LocalVarOffset> {
        match self.base {
            AddressBase::Pointer(slot) if self.elements.is_empty() => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn address_expression(&self) -> Expression {
        Expression::Address {
            base: self.base,
            elements: self.elements.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_chains_fold_to_a_slot() {
        let access = Access::stack(LocalVarOffset(8))
            .with_element(AddressElement::FieldOffset(4))
            .with_element(AddressElement::FieldOffset(2));
        assert_eq!(access.plain_slot(), Some(LocalVarOffset(14)));
    }

    #[test]
    fn index_elements_do_not_fold() {
        let access = Access::stack(LocalVarOffset(0)).with_element(AddressElement::UncheckedIndex {
            index: LocalVarOffset(4),
            element_size: 2,
        });
        assert_eq!(access.plain_slot(), None);
    }
}
