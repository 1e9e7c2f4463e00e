use super::parser::parse_descriptor;
use crate::error::{FormulabError, Result};
use crate::types::{Descriptor, UnaryOp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateKind {
    Log,
    LogAbs,
    Sin,
    Exp,
    /// Placeholder-bearing but outside the closed operator set.
    Other,
}

impl TemplateKind {
    /// `log((x+C))` and `log(abs((x+C)))`.
    pub fn is_log_family(self) -> bool {
        matches!(self, TemplateKind::Log | TemplateKind::LogAbs)
    }
}

/// Classification of a descriptor against the `op((feature+$C))` templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub kind: TemplateKind,
    pub base: String,
    pub has_placeholder: bool,
}

impl Template {
    /// Parse and classify. Strings matching no template and carrying no
    /// placeholder fail with a parse error; callers fall back to generic
    /// evaluation for those.
    pub fn parse(source: &str) -> Result<Template> {
        let descriptor = parse_descriptor(source)?;
        Self::classify(&descriptor)
            .ok_or_else(|| FormulabError::parse(source, "matches no operator template"))
    }

    pub fn classify(descriptor: &Descriptor) -> Option<Template> {
        if let Descriptor::Unary { op, child } = descriptor {
            let kind = match op {
                UnaryOp::Log => Some(TemplateKind::Log),
                UnaryOp::Sin => Some(TemplateKind::Sin),
                UnaryOp::Exp => Some(TemplateKind::Exp),
                _ => None,
            };
            if let (Some(kind), Some(base)) = (kind, shifted_base(child)) {
                return Some(Template {
                    kind,
                    base,
                    has_placeholder: true,
                });
            }
            if let (UnaryOp::Log, Descriptor::Unary { op: UnaryOp::Abs, child: inner }) =
                (op, child.as_ref())
            {
                if let Some(base) = shifted_base(inner) {
                    return Some(Template {
                        kind: TemplateKind::LogAbs,
                        base,
                        has_placeholder: true,
                    });
                }
            }
        }

        shifted_child(descriptor).map(|child| Template {
            kind: TemplateKind::Other,
            base: child.to_string(),
            has_placeholder: true,
        })
    }
}

/// Feature name of a `(feature+$C)` or `(-feature+$C)` node.
fn shifted_base(node: &Descriptor) -> Option<String> {
    let Descriptor::Shifted { child, .. } = node else {
        return None;
    };
    match child.as_ref() {
        Descriptor::Leaf(name) => Some(name.clone()),
        Descriptor::Unary {
            op: UnaryOp::Neg,
            child,
        } => match child.as_ref() {
            Descriptor::Leaf(name) => Some(name.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn shifted_child(node: &Descriptor) -> Option<&Descriptor> {
    match node {
        Descriptor::Leaf(_) | Descriptor::Literal(_) => None,
        Descriptor::Unary { child, .. } => shifted_child(child),
        Descriptor::Binary { left, right, .. } => shifted_child(left).or_else(|| shifted_child(right)),
        Descriptor::Shifted { child, .. } => Some(child),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_templates() {
        let t = Template::parse("log((x2+$C))").unwrap();
        assert_eq!(t.kind, TemplateKind::Log);
        assert_eq!(t.base, "x2");
        assert!(t.has_placeholder);
        assert!(t.kind.is_log_family());
        let resolved = parse_descriptor("log((x2+$C))").unwrap().with_constant(1.25);
        assert_eq!(Template::classify(&resolved).map(|t| t.kind), Some(TemplateKind::Log));

        assert_eq!(Template::parse("log(abs((x+$C)))").unwrap().kind, TemplateKind::LogAbs);
        assert_eq!(Template::parse("sin((x+$C))").unwrap().kind, TemplateKind::Sin);
        assert!(!TemplateKind::Sin.is_log_family());
        assert_eq!(Template::parse("exp((-x+$C))").unwrap().base, "x");
    }

    #[test]
    fn test_placeholder_outside_templates() {
        let t = Template::parse("sqrt(((a*b)+$C))").unwrap();
        assert_eq!(t.kind, TemplateKind::Other);
        assert_eq!(t.base, "(a*b)");
    }

    #[test]
    fn test_plain_expression_is_parse_error() {
        assert!(matches!(
            Template::parse("log(x2)"),
            Err(FormulabError::Parse { .. })
        ));
    }
}
