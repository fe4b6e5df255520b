//! Field manager: the caller-owned handle presented to `setup`/`apply`.

use crate::field::traits::Field;

/// Wraps a field for the duration of a map call. Presence of a manager on a
/// rank is what places that rank inside the source or target
/// sub-communicator.
#[derive(Debug)]
pub struct FieldManager<F> {
    field: F,
}

impl<F: Field> FieldManager<F> {
    pub fn new(field: F) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut F {
        &mut self.field
    }

    pub fn into_field(self) -> F {
        self.field
    }
}
