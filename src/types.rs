use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved token marking an unresolved additive constant inside a descriptor.
pub const PLACEHOLDER: &str = "$C";

/// Operator stage executed by the generator in one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Unary,
    Binary,
    Union,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Unary => write!(f, "unary"),
            StageKind::Binary => write!(f, "binary"),
            StageKind::Union => write!(f, "union"),
        }
    }
}

/// Optional behaviours of a generation stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    pub periodic: bool,
    pub reflect_negative: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Log,
    Sqrt,
    Abs,
    Sin,
    Cos,
    Exp,
    Square,
    Cube,
    Inverse,
}

impl UnaryOp {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Log => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Square => x * x,
            UnaryOp::Cube => x * x * x,
            UnaryOp::Inverse => 1.0 / x,
        }
    }

    /// Name used for function-call syntax, None for operators printed inline
    pub fn function_name(self) -> Option<&'static str> {
        match self {
            UnaryOp::Log => Some("log"),
            UnaryOp::Sqrt => Some("sqrt"),
            UnaryOp::Abs => Some("abs"),
            UnaryOp::Sin => Some("sin"),
            UnaryOp::Cos => Some("cos"),
            UnaryOp::Exp => Some("exp"),
            UnaryOp::Neg | UnaryOp::Square | UnaryOp::Cube | UnaryOp::Inverse => None,
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        match name {
            "log" => Some(UnaryOp::Log),
            "sqrt" => Some(UnaryOp::Sqrt),
            "abs" => Some(UnaryOp::Abs),
            "sin" => Some(UnaryOp::Sin),
            "cos" => Some(UnaryOp::Cos),
            "exp" => Some(UnaryOp::Exp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
            BinaryOp::Pow => '^',
        }
    }
}

/// Symbolic feature built from primitive variables.
///
/// The printed form of a descriptor is its name. `Shifted` is the
/// placeholder node `(child+$C)`; once `constant` is set the printer emits
/// the resolved literal instead of the token. A descriptor holds at most one
/// `Shifted` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Descriptor {
    Leaf(String),
    Literal(f64),
    Unary {
        op: UnaryOp,
        child: Box<Descriptor>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Descriptor>,
        right: Box<Descriptor>,
    },
    Shifted {
        child: Box<Descriptor>,
        constant: Option<f64>,
    },
}

impl Descriptor {
    pub fn leaf(name: impl Into<String>) -> Self {
        Descriptor::Leaf(name.into())
    }

    /// The constant-valued bias column.
    pub fn bias() -> Self {
        Descriptor::Literal(1.0)
    }

    pub fn unary(op: UnaryOp, child: Descriptor) -> Self {
        Descriptor::Unary {
            op,
            child: Box::new(child),
        }
    }

    pub fn binary(op: BinaryOp, left: Descriptor, right: Descriptor) -> Self {
        Descriptor::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn shifted(child: Descriptor) -> Self {
        Descriptor::Shifted {
            child: Box::new(child),
            constant: None,
        }
    }

    pub fn is_bias(&self) -> bool {
        matches!(self, Descriptor::Literal(v) if *v == 1.0)
    }

    pub fn placeholder_count(&self) -> usize {
        match self {
            Descriptor::Leaf(_) | Descriptor::Literal(_) => 0,
            Descriptor::Unary { child, .. } => child.placeholder_count(),
            Descriptor::Binary { left, right, .. } => {
                left.placeholder_count() + right.placeholder_count()
            }
            Descriptor::Shifted { child, .. } => 1 + child.placeholder_count(),
        }
    }

    pub fn has_placeholder(&self) -> bool {
        self.placeholder_slot().is_some()
    }

    /// `Some(None)` for an unresolved placeholder, `Some(Some(c))` once resolved.
    pub fn placeholder_slot(&self) -> Option<Option<f64>> {
        match self {
            Descriptor::Leaf(_) | Descriptor::Literal(_) => None,
            Descriptor::Unary { child, .. } => child.placeholder_slot(),
            Descriptor::Binary { left, right, .. } => {
                left.placeholder_slot().or_else(|| right.placeholder_slot())
            }
            Descriptor::Shifted { constant, .. } => Some(*constant),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.placeholder_slot(), Some(None))
    }

    pub fn resolved_constant(&self) -> Option<f64> {
        self.placeholder_slot().flatten()
    }

    /// Copy of this descriptor with its placeholder resolved to `constant`.
    /// Descriptors without a placeholder are returned unchanged.
    pub fn with_constant(&self, constant: f64) -> Descriptor {
        match self {
            Descriptor::Leaf(_) | Descriptor::Literal(_) => self.clone(),
            Descriptor::Unary { op, child } => Descriptor::unary(*op, child.with_constant(constant)),
            Descriptor::Binary { op, left, right } => Descriptor::binary(
                *op,
                left.with_constant(constant),
                right.with_constant(constant),
            ),
            Descriptor::Shifted { child, .. } => Descriptor::Shifted {
                child: child.clone(),
                constant: Some(constant),
            },
        }
    }

    /// True for the bare `(feature+$C)` pattern: a top-level shifted term over
    /// one primitive feature, optionally negated.
    pub fn is_shiftable_term(&self) -> bool {
        match self {
            Descriptor::Shifted { child, .. } => child.shift_base().is_some(),
            _ => false,
        }
    }

    fn shift_base(&self) -> Option<&str> {
        match self {
            Descriptor::Leaf(name) => Some(name.as_str()),
            Descriptor::Unary {
                op: UnaryOp::Neg,
                child,
            } => match child.as_ref() {
                Descriptor::Leaf(name) => Some(name.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether refinement can change this descriptor's column in a way the
    /// intercept cannot absorb.
    pub fn needs_refinement(&self) -> bool {
        self.is_unresolved() && !matches!(self, Descriptor::Shifted { .. })
    }

    /// Primitive variable names referenced by this descriptor, in first-use order.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Descriptor::Leaf(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Descriptor::Literal(_) => {}
            Descriptor::Unary { child, .. } | Descriptor::Shifted { child, .. } => {
                child.collect_variables(out)
            }
            Descriptor::Binary { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
        }
    }
}

/// Operand wrapper that parenthesizes prefix minus and postfix powers, so
/// `^` never chains and `-` never binds to a power.
struct Atom<'a>(&'a Descriptor);

impl fmt::Display for Atom<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Descriptor::Unary {
                op: UnaryOp::Neg | UnaryOp::Square | UnaryOp::Cube,
                ..
            } => write!(f, "({})", self.0),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Leaf(name) => write!(f, "{}", name),
            Descriptor::Literal(v) if *v < 0.0 => write!(f, "({})", v),
            Descriptor::Literal(v) => write!(f, "{}", v),
            Descriptor::Unary { op, child } => match op {
                UnaryOp::Neg => write!(f, "-{}", Atom(child)),
                UnaryOp::Square => write!(f, "{}^2", Atom(child)),
                UnaryOp::Cube => write!(f, "{}^3", Atom(child)),
                UnaryOp::Inverse => write!(f, "(1/{})", Atom(child)),
                named => {
                    // function_name is Some for every remaining op
                    let name = named.function_name().unwrap_or("?");
                    write!(f, "{}({})", name, child)
                }
            },
            Descriptor::Binary { op, left, right } => match op {
                BinaryOp::Pow => write!(f, "({}^{})", Atom(left), Atom(right)),
                _ => write!(f, "({}{}{})", left, op.symbol(), right),
            },
            Descriptor::Shifted { child, constant } => match constant {
                None => write!(f, "({}+{})", child, PLACEHOLDER),
                Some(c) if *c < 0.0 => write!(f, "({}-{})", child, -c),
                Some(c) => write!(f, "({}+{})", child, c),
            },
        }
    }
}

/// Physical dimension as exponents over base units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit(pub Vec<f64>);

impl Unit {
    pub fn dimensionless(rank: usize) -> Self {
        Unit(vec![0.0; rank])
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.iter().all(|e| e.abs() < 1e-9)
    }

    pub fn same_as(&self, other: &Unit) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|(a, b)| (a - b).abs() < 1e-9)
    }

    pub fn combine(&self, other: &Unit, sign: f64) -> Unit {
        Unit(self.0.iter().zip(&other.0).map(|(a, b)| a + sign * b).collect())
    }

    pub fn scale(&self, factor: f64) -> Unit {
        Unit(self.0.iter().map(|e| e * factor).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifted_printing() {
        let term = Descriptor::shifted(Descriptor::leaf("x2"));
        assert_eq!(term.to_string(), "(x2+$C)");
        let log = Descriptor::unary(UnaryOp::Log, term.clone());
        assert_eq!(log.to_string(), "log((x2+$C))");
        assert_eq!(log.with_constant(1.5).to_string(), "log((x2+1.5))");
        assert_eq!(term.with_constant(-0.25).to_string(), "(x2-0.25)");
    }

    #[test]
    fn test_reflected_term_printing() {
        let term = Descriptor::shifted(Descriptor::unary(UnaryOp::Neg, Descriptor::leaf("x")));
        assert_eq!(term.to_string(), "(-x+$C)");
        assert!(term.is_shiftable_term());
    }

    #[test]
    fn test_placeholder_queries() {
        let log = Descriptor::unary(UnaryOp::Log, Descriptor::shifted(Descriptor::leaf("a")));
        assert!(log.has_placeholder());
        assert!(log.is_unresolved());
        assert!(log.needs_refinement());
        let resolved = log.with_constant(0.3);
        assert!(!resolved.is_unresolved());
        assert_eq!(resolved.resolved_constant(), Some(0.3));

        let bare = Descriptor::shifted(Descriptor::leaf("a"));
        assert!(bare.is_unresolved());
        assert!(!bare.needs_refinement());
    }

    #[test]
    fn test_binary_and_power_printing() {
        let d = Descriptor::binary(
            BinaryOp::Mul,
            Descriptor::leaf("a"),
            Descriptor::unary(UnaryOp::Square, Descriptor::leaf("b")),
        );
        assert_eq!(d.to_string(), "(a*b^2)");
        let nested = Descriptor::unary(UnaryOp::Square, Descriptor::unary(UnaryOp::Square, Descriptor::leaf("x")));
        assert_eq!(nested.to_string(), "(x^2)^2");
        assert_eq!(Descriptor::unary(UnaryOp::Neg, nested).to_string(), "-((x^2)^2)");
        assert_eq!(Descriptor::bias().to_string(), "1");
        assert_eq!(d.variables(), vec!["a", "b"]);
    }
}
