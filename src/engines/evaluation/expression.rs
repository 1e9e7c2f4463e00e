use crate::data::PrimitiveMatrix;
use crate::error::{FormulabError, Result};
use crate::types::Descriptor;
use ndarray::{Array1, Zip};

/// Elementwise evaluator over the primitive matrix.
///
/// Domain violations (log of a non-positive value, division by zero) come
/// back as NaN or infinity; screening removes such columns later.
pub struct ExpressionEvaluator<'a> {
    primitives: &'a PrimitiveMatrix,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(primitives: &'a PrimitiveMatrix) -> Self {
        Self { primitives }
    }

    /// Evaluate `descriptor`, substituting `constant` for its placeholder.
    ///
    /// With `constant == None` a resolved placeholder uses its own value and
    /// an unresolved one is an error.
    pub fn evaluate(&self, descriptor: &Descriptor, constant: Option<f64>) -> Result<Array1<f64>> {
        match descriptor {
            Descriptor::Leaf(name) => self
                .primitives
                .column(name)
                .map(|c| c.to_owned())
                .ok_or_else(|| FormulabError::Eval(format!("unknown variable '{}'", name))),
            Descriptor::Literal(value) => Ok(Array1::from_elem(self.primitives.n_rows(), *value)),
            Descriptor::Unary { op, child } => {
                let mut values = self.evaluate(child, constant)?;
                values.mapv_inplace(|v| op.apply(v));
                Ok(values)
            }
            Descriptor::Binary { op, left, right } => {
                let mut lhs = self.evaluate(left, constant)?;
                let rhs = self.evaluate(right, constant)?;
                Zip::from(&mut lhs)
                    .and(&rhs)
                    .for_each(|a, &b| *a = op.apply(*a, b));
                Ok(lhs)
            }
            Descriptor::Shifted {
                child,
                constant: resolved,
            } => {
                let shift = constant.or(*resolved).ok_or_else(|| {
                    FormulabError::Eval(format!("unresolved placeholder in '{}'", descriptor))
                })?;
                let mut values = self.evaluate(child, constant)?;
                values += shift;
                Ok(values)
            }
        }
    }
}

impl Descriptor {
    pub fn evaluate(&self, primitives: &PrimitiveMatrix, constant: Option<f64>) -> Result<Array1<f64>> {
        ExpressionEvaluator::new(primitives).evaluate(self, constant)
    }
}
