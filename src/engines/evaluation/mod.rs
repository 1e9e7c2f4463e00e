pub mod design;
pub mod expression;
pub mod parser;
pub mod template;

pub use design::{build_design_matrix, current_constants, rematerialize_lenient};
pub use expression::ExpressionEvaluator;
pub use parser::{is_identifier, parse_descriptor};
pub use template::{Template, TemplateKind};
