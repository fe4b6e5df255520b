//! Source field evaluator callback.

use crate::field::traits::FieldContainer;

/// User callback invoked once the map is built.
///
/// `entities` holds one source entity global id per requested point (mesh
/// element ids for the shared-domain map, geometry gids for the
/// volume-source map); `coords` holds the matching blocked coordinates,
/// `dim * entities.len()` long. The result must carry one value tuple per
/// pair, dimensioned like the target field.
pub trait FieldEvaluator {
    fn evaluate(&self, entities: &[u64], coords: &[f64]) -> FieldContainer;
}

impl<T: Fn(&[u64], &[f64]) -> FieldContainer> FieldEvaluator for T {
    fn evaluate(&self, entities: &[u64], coords: &[f64]) -> FieldContainer {
        self(entities, coords)
    }
}
