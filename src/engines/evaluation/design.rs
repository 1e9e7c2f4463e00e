use super::expression::ExpressionEvaluator;
use crate::data::PrimitiveMatrix;
use crate::error::{FormulabError, Result};
use crate::types::Descriptor;
use ndarray::Array2;

/// Evaluate every descriptor, in order, into one design matrix.
///
/// `constants[j]` is substituted for descriptor j's placeholder and ignored
/// for descriptors without one. This is the only path through which columns
/// are rematerialized after constants change.
pub fn build_design_matrix(
    descriptors: &[Descriptor],
    constants: &[f64],
    primitives: &PrimitiveMatrix,
) -> Result<Array2<f64>> {
    if descriptors.len() != constants.len() {
        return Err(FormulabError::Configuration(format!(
            "{} constants for {} descriptors",
            constants.len(),
            descriptors.len()
        )));
    }

    let evaluator = ExpressionEvaluator::new(primitives);
    let mut design = Array2::zeros((primitives.n_rows(), descriptors.len()));
    for (j, (descriptor, &constant)) in descriptors.iter().zip(constants).enumerate() {
        let substitute = descriptor.has_placeholder().then_some(constant);
        let column = evaluator.evaluate(descriptor, substitute)?;
        design.column_mut(j).assign(&column);
    }
    Ok(design)
}

/// Starting constants: the resolved value, `surrogate` when unresolved, 0 otherwise.
pub fn current_constants(descriptors: &[Descriptor], surrogate: f64) -> Vec<f64> {
    descriptors
        .iter()
        .map(|d| match d.placeholder_slot() {
            Some(Some(c)) => c,
            Some(None) => surrogate,
            None => 0.0,
        })
        .collect()
}

/// Evaluate what can be evaluated; descriptors that fail are dropped with a warning.
///
/// Returns the surviving descriptors and their columns.
pub fn rematerialize_lenient(
    descriptors: Vec<Descriptor>,
    primitives: &PrimitiveMatrix,
    surrogate: f64,
) -> (Vec<Descriptor>, Array2<f64>) {
    let evaluator = ExpressionEvaluator::new(primitives);
    let constants = current_constants(&descriptors, surrogate);
    let mut kept = Vec::with_capacity(descriptors.len());
    let mut columns = Vec::with_capacity(descriptors.len());

    for (descriptor, constant) in descriptors.into_iter().zip(constants) {
        let substitute = descriptor.has_placeholder().then_some(constant);
        match evaluator.evaluate(&descriptor, substitute) {
            Ok(column) => {
                columns.push(column);
                kept.push(descriptor);
            }
            Err(e) => log::warn!("Dropping descriptor '{}': {}", descriptor, e),
        }
    }

    let mut design = Array2::zeros((primitives.n_rows(), kept.len()));
    for (j, column) in columns.iter().enumerate() {
        design.column_mut(j).assign(column);
    }
    (kept, design)
}
