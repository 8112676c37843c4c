use crate::Tag;
use alloc::vec::Vec;
use core::cell::RefCell;

/// A component that contributes a slice of persisted state.
///
/// `tag` and `version` must be stable for the lifetime of the supplier. Bump the version
/// whenever the meaning or the number of words returned by `saved_state` changes, stale records
/// are then not handed to `restore_state`.
pub trait StateSupplier {
    fn tag(&self) -> Tag;

    fn version(&self) -> i32;

    /// The current state as opaque words.
    fn saved_state(&self) -> Vec<i32>;

    /// Adopts a previously saved state. Returns `false` and leaves the supplier untouched if the
    /// payload has the wrong shape.
    fn restore_state(&mut self, state: &[i32]) -> bool;
}

/// Borrowed handle to a registered supplier. Suppliers outlive the registry they are
/// registered with.
pub type SupplierRef<'a> = &'a RefCell<dyn StateSupplier + 'a>;

/// Ordered list of suppliers. The registration order is the order of the records in flash,
/// loading matches records by tag.
///
/// Registering two suppliers with the same tag is not detected, both receive the same record
/// on load.
#[derive(Default)]
pub struct Registry<'a> {
    suppliers: Vec<SupplierRef<'a>>,
}

impl<'a> Registry<'a> {
    pub const fn new() -> Self {
        Self {
            suppliers: Vec::new(),
        }
    }

    pub fn register(&mut self, supplier: SupplierRef<'a>) {
        self.suppliers.push(supplier);
    }

    /// Registers the supplier if there is one, `None` is silently ignored.
    pub fn register_optional(&mut self, supplier: Option<SupplierRef<'a>>) {
        if let Some(supplier) = supplier {
            self.register(supplier);
        }
    }

    pub fn len(&self) -> usize {
        self.suppliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suppliers.is_empty()
    }

    /// Suppliers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = SupplierRef<'a>> + '_ {
        self.suppliers.iter().copied()
    }
}
