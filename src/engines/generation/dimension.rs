use crate::data::UnitTable;
use crate::types::{BinaryOp, Descriptor, UnaryOp, Unit};

/// Decides whether a candidate descriptor is dimensionally consistent.
pub trait DimensionFilter: Send + Sync {
    /// Unit of `descriptor`, or `None` when it combines incompatible units.
    fn infer(&self, unit_table: &UnitTable, descriptor: &Descriptor) -> Option<Unit>;

    fn accepts(&self, unit_table: &UnitTable, descriptor: &Descriptor) -> bool {
        self.infer(unit_table, descriptor).is_some()
    }
}

/// Unit inference over exponent vectors.
///
/// `+` and `-` demand equal units, `*` and `/` add and subtract exponents,
/// powers scale them, and transcendental functions return dimensionless
/// values. A shifted term keeps the unit of its child.
#[derive(Debug, Clone, Copy, Default)]
pub struct DimensionalAnalysis;

impl DimensionFilter for DimensionalAnalysis {
    fn infer(&self, unit_table: &UnitTable, descriptor: &Descriptor) -> Option<Unit> {
        let rank = unit_table.values().map(|u| u.0.len()).max().unwrap_or(0);
        infer_unit(unit_table, descriptor, rank)
    }
}

fn infer_unit(table: &UnitTable, descriptor: &Descriptor, rank: usize) -> Option<Unit> {
    match descriptor {
        Descriptor::Leaf(name) => table.get(name).cloned(),
        Descriptor::Literal(_) => Some(Unit::dimensionless(rank)),
        Descriptor::Shifted { child, .. } => infer_unit(table, child, rank),
        Descriptor::Unary { op, child } => {
            let unit = infer_unit(table, child, rank)?;
            match op {
                UnaryOp::Neg | UnaryOp::Abs => Some(unit),
                UnaryOp::Sqrt => Some(unit.scale(0.5)),
                UnaryOp::Square => Some(unit.scale(2.0)),
                UnaryOp::Cube => Some(unit.scale(3.0)),
                UnaryOp::Inverse => Some(unit.scale(-1.0)),
                UnaryOp::Log | UnaryOp::Sin | UnaryOp::Cos | UnaryOp::Exp => {
                    Some(Unit::dimensionless(rank))
                }
            }
        }
        Descriptor::Binary { op, left, right } => {
            let lhs = infer_unit(table, left, rank)?;
            match op {
                BinaryOp::Add | BinaryOp::Sub => {
                    let rhs = infer_unit(table, right, rank)?;
                    lhs.same_as(&rhs).then_some(lhs)
                }
                BinaryOp::Mul => Some(lhs.combine(&infer_unit(table, right, rank)?, 1.0)),
                BinaryOp::Div => Some(lhs.combine(&infer_unit(table, right, rank)?, -1.0)),
                BinaryOp::Pow => match right.as_ref() {
                    Descriptor::Literal(k) => Some(lhs.scale(*k)),
                    other => {
                        let rhs = infer_unit(table, other, rank)?;
                        (lhs.is_dimensionless() && rhs.is_dimensionless()).then_some(lhs)
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::parse_descriptor;

    fn table() -> UnitTable {
        // [length, time]
        let mut table = UnitTable::new();
        table.insert("dist".to_string(), Unit(vec![1.0, 0.0]));
        table.insert("height".to_string(), Unit(vec![1.0, 0.0]));
        table.insert("t".to_string(), Unit(vec![0.0, 1.0]));
        table
    }

    fn infer(s: &str) -> Option<Unit> {
        DimensionalAnalysis.infer(&table(), &parse_descriptor(s).unwrap())
    }

    #[test]
    fn test_addition_requires_matching_units() {
        assert_eq!(infer("(dist+height)"), Some(Unit(vec![1.0, 0.0])));
        assert_eq!(infer("(dist-t)"), None);
    }

    #[test]
    fn test_products_combine_exponents() {
        assert_eq!(infer("(dist/t)"), Some(Unit(vec![1.0, -1.0])));
        assert_eq!(infer("sqrt((dist*height))"), Some(Unit(vec![1.0, 0.0])));
        assert_eq!(infer("(1/t)"), Some(Unit(vec![0.0, -1.0])));
    }

    #[test]
    fn test_transcendental_is_dimensionless() {
        let unit = infer("log((t+$C))").unwrap();
        assert!(unit.is_dimensionless());
        assert!(DimensionalAnalysis.accepts(&table(), &parse_descriptor("exp(dist)").unwrap()));
        assert!(!DimensionalAnalysis.accepts(&table(), &parse_descriptor("(t+unknown)").unwrap()));
    }
}
