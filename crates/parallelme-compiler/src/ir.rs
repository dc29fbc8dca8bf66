//! Intermediate representation of user-library usage.
//!
//! The second pass lowers recognized user-library constructs into these
//! target-neutral value types; the translation phase consumes them without
//! further mutation. All IR types compare structurally, including
//! [`Literal`].
//!
//! # Design
//!
//! - `InputBind` / `OutputBind` — host-data boundary crossings
//! - `Operation` — a higher-order call (`foreach`, `map`, `reduce`,
//!   `filter`) with its captured user function and free variables
//! - `MethodCall` — a plain accessor call routed through the wrapper
//! - `classify` — the parallel/sequential decision

use parallelme_syntax::ast::Modifier;
use parallelme_syntax::TokenAddress;
use tracing::warn;

/// A host variable referenced by the IR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    /// Element type for parametric user-library classes (`Array<Int32>`)
    pub type_parameter: Option<String>,
    pub modifier: Modifier,
    /// Disambiguates homonyms declared in different scopes
    pub identifier: u32,
}

impl Variable {
    /// Whether the declaration was `final`.
    pub fn is_final(&self) -> bool {
        self.modifier.is_final()
    }
}

/// A constant bind argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    /// Spelling as written in the host source
    pub value: String,
    /// Host type name (`int`, `float`, `boolean`, `char`, `String`)
    pub type_name: String,
}

/// An opaque host-source fragment passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub text: String,
}

/// A bind argument: literal, variable or opaque expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    Literal(Literal),
    Variable(Variable),
    Expression(Expression),
}

impl Parameter {
    /// Spelling used when re-emitting the argument at a call site.
    pub fn call_text(&self) -> &str {
        match self {
            Parameter::Literal(lit) => &lit.value,
            Parameter::Variable(var) => &var.name,
            Parameter::Expression(expr) => &expr.text,
        }
    }
}

/// Construction of a user-library collection from host data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBind {
    pub variable: Variable,
    /// Monotonic from 1 in lexical order within a class
    pub sequence_index: u32,
    pub arguments: Vec<Parameter>,
    /// Declaration tokens, deleted on rewrite
    pub declaration_range: TokenAddress,
    /// Creation tokens, replaced by the wrapper call on rewrite
    pub creation_range: TokenAddress,
}

/// How an output bind is embedded in the host source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputBindKind {
    /// `Bitmap b = image.toBitmap();` — the destination is declared in the
    /// same statement and must be re-declared by the rewrite
    DeclarativeAssignment,
    /// `b = image.toBitmap();` or `image.toBitmap(b);`
    Assignment,
}

/// Materialization of a user-library collection back into host data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBind {
    pub variable: Variable,
    pub destination: Variable,
    /// Monotonic from 1 in lexical order within a class
    pub sequence_index: u32,
    pub statement_range: TokenAddress,
    pub kind: OutputBindKind,
}

/// Higher-order operation kinds the user library exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Foreach,
    Map,
    Reduce,
    Filter,
}

impl OperationKind {
    /// Lower-case name, used both for method recognition and for generated
    /// wrapper method names.
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Foreach => "foreach",
            OperationKind::Map => "map",
            OperationKind::Reduce => "reduce",
            OperationKind::Filter => "filter",
        }
    }
}

/// Parallel or sequential lowering of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    Parallel,
    Sequential,
}

/// The user-supplied anonymous function of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunction {
    /// Body text captured verbatim, braces included
    pub code: String,
    /// Declared parameters (one, or two for `reduce`)
    pub arguments: Vec<Variable>,
}

impl UserFunction {
    /// The function's element parameter.
    pub fn variable_argument(&self) -> &Variable {
        &self.arguments[0]
    }
}

/// A recognized higher-order operation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub variable: Variable,
    /// 1-based discovery index within the class; names `function<n>` and the
    /// wrapper method
    pub number: u32,
    pub kind: OperationKind,
    pub user_function: UserFunction,
    /// Free variables of the user function, in order of first reference
    pub external_variables: Vec<Variable>,
    pub statement_range: TokenAddress,
    pub execution: ExecutionType,
}

/// A plain accessor call on a user-library variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub variable: Variable,
    pub method_name: String,
    /// Monotonic from 1 per class, after deduplication
    pub sequence_index: u32,
    /// The call expression tokens, replaced on rewrite
    pub expression_range: TokenAddress,
}

/// Everything the second pass extracted for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationsAndBinds {
    pub input_binds: Vec<InputBind>,
    pub operations: Vec<Operation>,
    pub output_binds: Vec<OutputBind>,
}

impl OperationsAndBinds {
    /// Whether nothing user-library related was found.
    pub fn is_empty(&self) -> bool {
        self.input_binds.is_empty() && self.operations.is_empty() && self.output_binds.is_empty()
    }
}

/// Decide parallel vs. sequential execution for an operation.
///
/// Parallel iff every external variable is `final`. The decision is made
/// once and never revisited; a demotion logs a warning naming the source
/// line of the operation statement.
pub fn classify(operation: &mut Operation) {
    operation.execution = ExecutionType::Parallel;
    for variable in &operation.external_variables {
        if !variable.is_final() {
            warn!(
                "Operation with non-final external variable in line {} will be translated \
                 to a sequential operation in the target runtime.",
                operation.statement_range.line
            );
            operation.execution = ExecutionType::Sequential;
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str, modifier: Modifier) -> Variable {
        Variable {
            name: name.to_string(),
            type_name: "float".to_string(),
            type_parameter: None,
            modifier,
            identifier: 0,
        }
    }

    fn operation(externals: Vec<Variable>) -> Operation {
        Operation {
            variable: Variable {
                name: "image".to_string(),
                type_name: "BitmapImage".to_string(),
                type_parameter: None,
                modifier: Modifier::None,
                identifier: 0,
            },
            number: 1,
            kind: OperationKind::Foreach,
            user_function: UserFunction {
                code: "{ }".to_string(),
                arguments: vec![variable("pixel", Modifier::None)],
            },
            external_variables: externals,
            statement_range: TokenAddress::new(0, 3, 7, 1),
            execution: ExecutionType::Parallel,
        }
    }

    #[test]
    fn test_classify_all_final_is_parallel() {
        let mut op = operation(vec![variable("k", Modifier::Final)]);
        classify(&mut op);
        assert_eq!(op.execution, ExecutionType::Parallel);
    }

    #[test]
    fn test_classify_non_final_is_sequential() {
        let mut op = operation(vec![
            variable("k", Modifier::Final),
            variable("m", Modifier::None),
        ]);
        classify(&mut op);
        assert_eq!(op.execution, ExecutionType::Sequential);
    }

    #[test]
    fn test_classify_no_externals_is_parallel() {
        let mut op = operation(Vec::new());
        classify(&mut op);
        assert_eq!(op.execution, ExecutionType::Parallel);
    }

    #[test]
    fn test_literal_structural_equality() {
        let a = Literal {
            value: "1.5f".to_string(),
            type_name: "float".to_string(),
        };
        let b = Literal {
            value: "1.5f".to_string(),
            type_name: "float".to_string(),
        };
        assert_eq!(a, b);
    }
}
