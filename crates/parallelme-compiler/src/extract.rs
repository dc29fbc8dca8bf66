//! Second compiler pass: user-library extraction.
//!
//! Consumes the parse tree, the populated symbol table and the token stream
//! and produces the IR for one class: input binds from creators attributed
//! to user-library collection variables, operations from higher-order calls
//! with their captured user functions and free variables, output binds from
//! to-host calls, and accessor method calls. Also reports the package name
//! and the import token ranges.
//!
//! Capture analysis is a lexical walk over the user-function body tokens: an
//! identifier is free when it is not a member access, not a call name, not a
//! lambda parameter, not declared inside the body, and resolves upward from
//! the operation's scope to a non-user-library variable. Free variables are
//! recorded in order of first reference.

use crate::catalog::{MethodSemantics, UserLibraryCatalog};
use crate::error::{CompilationError, CompilationResult};
use crate::ir::{self, OperationsAndBinds, OutputBindKind, Parameter};
use crate::symbols::{SymbolFilter, SymbolId, SymbolKind, SymbolTable};
use parallelme_syntax::ast::*;
use parallelme_syntax::{Token, TokenAddress, TokenStream};
use std::collections::{HashMap, HashSet};

/// Everything the second pass produced for one class.
#[derive(Debug)]
pub struct ClassExtraction {
    pub class_name: String,
    /// Class declaration and body ranges, used by the host rewrite
    pub class_address: TokenAddress,
    pub class_body: TokenAddress,
    pub package_name: String,
    /// Import statement ranges, available for pruning
    pub import_addresses: Vec<TokenAddress>,
    pub operations_and_binds: OperationsAndBinds,
    pub method_calls: Vec<ir::MethodCall>,
}

/// Run the second pass for the class at `class_index` of the unit.
pub fn run(
    catalog: &UserLibraryCatalog,
    unit: &CompilationUnit,
    stream: &TokenStream,
    table: &SymbolTable,
    class_index: usize,
) -> CompilationResult<ClassExtraction> {
    let class = &unit.classes[class_index];
    let class_scope = table.collect(table.root(), SymbolFilter::Class, false)[class_index];

    let mut extractor = Extractor {
        catalog,
        stream,
        table,
        operation_count: 0,
        output_bind_count: 0,
        method_call_keys: HashMap::new(),
        operations: Vec::new(),
        output_binds: Vec::new(),
        method_calls: Vec::new(),
    };

    let input_binds = extractor.input_binds(class_scope)?;

    let mut method_counts: HashMap<&str, usize> = HashMap::new();
    for method in &class.methods {
        let seen = method_counts.entry(method.name.as_str()).or_insert(0);
        let scopes = table.lookup_in_scope(class_scope, &method.name, SymbolFilter::Method);
        let scope = scopes[*seen];
        *seen += 1;
        extractor.block(scope, &method.body)?;
    }

    Ok(ClassExtraction {
        class_name: class.name.clone(),
        class_address: class.address,
        class_body: class.body,
        package_name: unit
            .package
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default(),
        import_addresses: unit.imports.iter().map(|i| i.address).collect(),
        operations_and_binds: OperationsAndBinds {
            input_binds,
            operations: extractor.operations,
            output_binds: extractor.output_binds,
        },
        method_calls: extractor.method_calls,
    })
}

struct Extractor<'a> {
    catalog: &'a UserLibraryCatalog,
    stream: &'a TokenStream,
    table: &'a SymbolTable,
    operation_count: u32,
    output_bind_count: u32,
    /// (variable, method) → wrapper sequence index, for deduplication
    method_call_keys: HashMap<(String, String), u32>,
    operations: Vec<ir::Operation>,
    output_binds: Vec<ir::OutputBind>,
    method_calls: Vec<ir::MethodCall>,
}

/// Statement context a recognized call appears in.
enum CallContext<'t> {
    Plain,
    Assignment(&'t str),
    Declarative(&'t str),
}

impl<'a> Extractor<'a> {
    fn ir_variable(&self, id: SymbolId) -> ir::Variable {
        let data = self.table.data(id);
        match &data.kind {
            SymbolKind::Variable {
                type_name,
                type_parameter,
                modifier,
                ..
            } => ir::Variable {
                name: data.name.clone(),
                type_name: type_name.clone(),
                type_parameter: type_parameter.clone(),
                modifier: *modifier,
                identifier: data.identifier,
            },
            other => unreachable!("symbol {:?} is not a variable", other),
        }
    }

    /// Input binds: every creator whose attributed object resolves to a
    /// user-library collection variable, in lexical order.
    fn input_binds(&self, class_scope: SymbolId) -> CompilationResult<Vec<ir::InputBind>> {
        let mut binds = Vec::new();
        let mut sequence = 0u32;
        for creator_id in self.table.collect(class_scope, SymbolFilter::Creator, true) {
            let creator = self.table.data(creator_id);
            // Argument markers are Creator symbols nested under creators;
            // only scope-level creators with an attributed object count.
            let SymbolKind::Creator {
                attributed_object,
                arguments,
                statement_address,
            } = &creator.kind
            else {
                continue;
            };
            if attributed_object.is_empty() {
                continue;
            }
            let Some(scope) = self.table.parent(creator_id) else {
                continue;
            };
            let Some(variable_id) =
                self.table
                    .lookup_upward(scope, attributed_object, SymbolFilter::UserLibraryVariable)
            else {
                continue;
            };
            let variable = self.ir_variable(variable_id);
            if !self.catalog.is_collection(&variable.type_name) {
                continue;
            }
            let declaration_range = match &self.table.data(variable_id).kind {
                SymbolKind::Variable {
                    statement_address, ..
                } => *statement_address,
                _ => continue,
            };
            sequence += 1;
            binds.push(ir::InputBind {
                variable,
                sequence_index: sequence,
                arguments: self.bind_arguments(scope, arguments, statement_address.line)?,
                declaration_range,
                creation_range: *statement_address,
            });
        }
        Ok(binds)
    }

    fn bind_arguments(
        &self,
        scope: SymbolId,
        arguments: &[SymbolId],
        line: u32,
    ) -> CompilationResult<Vec<Parameter>> {
        let mut parameters = Vec::with_capacity(arguments.len());
        for &argument in arguments {
            let data = self.table.data(argument);
            let parameter = match &data.kind {
                SymbolKind::Literal { kind, value } => Parameter::Literal(ir::Literal {
                    value: value.clone(),
                    type_name: kind.type_name().to_string(),
                }),
                SymbolKind::Expression { text } => {
                    match is_identifier(text)
                        .then(|| self.table.lookup_upward(scope, text, SymbolFilter::Variable))
                        .flatten()
                    {
                        Some(variable_id) => Parameter::Variable(self.ir_variable(variable_id)),
                        None => Parameter::Expression(ir::Expression { text: text.clone() }),
                    }
                }
                _ => return Err(CompilationError::UnsupportedArgumentShape { line }),
            };
            parameters.push(parameter);
        }
        Ok(parameters)
    }

    fn block(&mut self, scope: SymbolId, block: &Block) -> CompilationResult<()> {
        for statement in &block.statements {
            self.statement(scope, statement)?;
        }
        Ok(())
    }

    fn statement(&mut self, scope: SymbolId, statement: &Statement) -> CompilationResult<()> {
        match &statement.kind {
            StatementKind::Expression(expr) => match &expr.kind {
                ExprKind::MethodCall { .. } => {
                    self.top_level_call(scope, statement, expr, CallContext::Plain)?;
                }
                ExprKind::Assign { target, value } => {
                    if let (Some(name), ExprKind::MethodCall { .. }) =
                        (target.as_identifier(), &value.kind)
                    {
                        self.top_level_call(scope, statement, value, CallContext::Assignment(name))?;
                    } else {
                        self.accessor_calls(scope, expr);
                    }
                }
                _ => self.accessor_calls(scope, expr),
            },
            StatementKind::LocalVariable { name, init, .. } => {
                if let Some(init) = init {
                    if let ExprKind::MethodCall { .. } = &init.kind {
                        self.top_level_call(scope, statement, init, CallContext::Declarative(name))?;
                    } else {
                        self.accessor_calls(scope, init);
                    }
                }
            }
            StatementKind::Return(Some(expr)) => self.accessor_calls(scope, expr),
            StatementKind::Return(None) => {}
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.accessor_calls(scope, condition);
                self.block(scope, then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.block(scope, else_branch)?;
                }
            }
            StatementKind::While { condition, body } => {
                self.accessor_calls(scope, condition);
                self.block(scope, body)?;
            }
            StatementKind::For { body, .. } => self.block(scope, body)?,
            StatementKind::Block(inner) => self.block(scope, inner)?,
        }
        Ok(())
    }

    /// Handle a statement-level call on a user-library variable: operation,
    /// output bind, or fall back to the accessor walk.
    fn top_level_call(
        &mut self,
        scope: SymbolId,
        statement: &Statement,
        call: &Expr,
        context: CallContext<'_>,
    ) -> CompilationResult<()> {
        let ExprKind::MethodCall {
            receiver: Some(receiver),
            name,
            args,
        } = &call.kind
        else {
            self.accessor_calls(scope, call);
            return Ok(());
        };
        let resolved = receiver.as_identifier().and_then(|object| {
            self.table
                .lookup_upward(scope, object, SymbolFilter::UserLibraryVariable)
        });
        let Some(variable_id) = resolved else {
            self.accessor_calls(scope, call);
            return Ok(());
        };
        let variable = self.ir_variable(variable_id);
        match self.catalog.valid_method(&variable.type_name, name) {
            Some(MethodSemantics::Operation(kind)) => {
                self.operation(scope, statement, variable, kind, args)
            }
            Some(MethodSemantics::OutputBind) => {
                self.output_bind(scope, statement, variable, args, context)
            }
            Some(MethodSemantics::Accessor(_)) => {
                self.accessor_calls(scope, call);
                Ok(())
            }
            // Methods the catalog does not recognize are left untouched.
            None => {
                self.accessor_calls(scope, call);
                Ok(())
            }
        }
    }

    fn operation(
        &mut self,
        scope: SymbolId,
        statement: &Statement,
        variable: ir::Variable,
        kind: ir::OperationKind,
        args: &[Expr],
    ) -> CompilationResult<()> {
        let line = statement.address.line;
        let [argument] = args else {
            return Err(CompilationError::UnsupportedArgumentShape { line });
        };
        let ExprKind::Lambda { params, body } = &argument.kind else {
            return Err(CompilationError::UnsupportedArgumentShape { line });
        };
        let mut arguments = Vec::with_capacity(params.len());
        for param in params {
            if !self.catalog.valid_function_argument_type(&param.type_name) {
                return Err(CompilationError::UnsupportedArgumentShape { line });
            }
            arguments.push(ir::Variable {
                name: param.name.clone(),
                type_name: param.type_name.clone(),
                type_parameter: param.type_parameters.first().cloned(),
                modifier: Modifier::None,
                identifier: 0,
            });
        }
        let code = self.stream.slice(&body.address).to_string();
        let external_variables = self.free_variables(scope, params, body);
        self.operation_count += 1;
        let mut operation = ir::Operation {
            variable,
            number: self.operation_count,
            kind,
            user_function: ir::UserFunction { code, arguments },
            external_variables,
            statement_range: statement.address,
            execution: ir::ExecutionType::Parallel,
        };
        ir::classify(&mut operation);
        self.operations.push(operation);
        Ok(())
    }

    fn output_bind(
        &mut self,
        scope: SymbolId,
        statement: &Statement,
        variable: ir::Variable,
        args: &[Expr],
        context: CallContext<'_>,
    ) -> CompilationResult<()> {
        let line = statement.address.line;
        let (destination_name, kind) = match context {
            CallContext::Declarative(name) => (name, OutputBindKind::DeclarativeAssignment),
            CallContext::Assignment(name) => (name, OutputBindKind::Assignment),
            CallContext::Plain => {
                let name = args
                    .first()
                    .and_then(|arg| arg.as_identifier())
                    .ok_or(CompilationError::UnsupportedArgumentShape { line })?;
                (name, OutputBindKind::Assignment)
            }
        };
        let destination = self
            .table
            .lookup_upward(scope, destination_name, SymbolFilter::Variable)
            .map(|id| self.ir_variable(id))
            .ok_or(CompilationError::UnsupportedArgumentShape { line })?;
        self.output_bind_count += 1;
        self.output_binds.push(ir::OutputBind {
            variable,
            destination,
            sequence_index: self.output_bind_count,
            statement_range: statement.address,
            kind,
        });
        Ok(())
    }

    /// Recursively record accessor calls on user-library variables anywhere
    /// in an expression. Lambda bodies are kernel code and are skipped.
    fn accessor_calls(&mut self, scope: SymbolId, expr: &Expr) {
        match &expr.kind {
            ExprKind::MethodCall {
                receiver,
                name,
                args,
            } => {
                if let Some(receiver) = receiver {
                    if let Some(object) = receiver.as_identifier() {
                        if let Some(variable_id) = self.table.lookup_upward(
                            scope,
                            object,
                            SymbolFilter::UserLibraryVariable,
                        ) {
                            let variable = self.ir_variable(variable_id);
                            if let Some(MethodSemantics::Accessor(_)) =
                                self.catalog.valid_method(&variable.type_name, name)
                            {
                                let key = (variable.name.clone(), name.clone());
                                let next = self.method_call_keys.len() as u32 + 1;
                                let sequence_index =
                                    *self.method_call_keys.entry(key).or_insert(next);
                                self.method_calls.push(ir::MethodCall {
                                    variable,
                                    method_name: name.clone(),
                                    sequence_index,
                                    expression_range: expr.address,
                                });
                            }
                        }
                    }
                    self.accessor_calls(scope, receiver);
                }
                for arg in args {
                    self.accessor_calls(scope, arg);
                }
            }
            ExprKind::Assign { target, value } => {
                self.accessor_calls(scope, target);
                self.accessor_calls(scope, value);
            }
            ExprKind::FieldAccess { object, .. } => self.accessor_calls(scope, object),
            ExprKind::Binary { left, right, .. } => {
                self.accessor_calls(scope, left);
                self.accessor_calls(scope, right);
            }
            ExprKind::Unary { operand, .. } | ExprKind::Postfix { operand, .. } => {
                self.accessor_calls(scope, operand)
            }
            ExprKind::Index { object, index } => {
                self.accessor_calls(scope, object);
                self.accessor_calls(scope, index);
            }
            ExprKind::Paren(inner) => self.accessor_calls(scope, inner),
            ExprKind::Creator { args, .. } => {
                for arg in args {
                    self.accessor_calls(scope, arg);
                }
            }
            ExprKind::Lambda { .. } | ExprKind::Identifier(_) | ExprKind::Literal { .. } => {}
        }
    }

    /// Lexical free-variable walk over a user-function body.
    fn free_variables(
        &self,
        scope: SymbolId,
        params: &[Param],
        body: &Block,
    ) -> Vec<ir::Variable> {
        let mut bound: HashSet<&str> = params.iter().map(|p| p.name.as_str()).collect();
        collect_local_names(body, &mut bound);

        let mut seen: HashSet<String> = HashSet::new();
        let mut free = Vec::new();
        for index in body.address.start + 1..body.address.stop {
            let Some(lexed) = self.stream.get(index) else {
                break;
            };
            if lexed.token != Token::Identifier {
                continue;
            }
            let previous = self.stream.get(index - 1).map(|t| t.token);
            if previous == Some(Token::Dot) {
                continue; // member access
            }
            if self.stream.get(index + 1).map(|t| t.token) == Some(Token::LParen) {
                continue; // call name
            }
            let name = self.stream.text(index);
            if bound.contains(name) || seen.contains(name) {
                continue;
            }
            let Some(variable_id) = self.table.lookup_upward(scope, name, SymbolFilter::Variable)
            else {
                continue;
            };
            if let SymbolKind::Variable { user_library, .. } = &self.table.data(variable_id).kind {
                if *user_library {
                    continue;
                }
            }
            seen.insert(name.to_string());
            free.push(self.ir_variable(variable_id));
        }
        free
    }
}

/// Names declared by statements inside a user-function body.
fn collect_local_names<'t>(block: &'t Block, names: &mut HashSet<&'t str>) {
    for statement in &block.statements {
        match &statement.kind {
            StatementKind::LocalVariable { name, .. } => {
                names.insert(name.as_str());
            }
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_local_names(then_branch, names);
                if let Some(else_branch) = else_branch {
                    collect_local_names(else_branch, names);
                }
            }
            StatementKind::While { body, .. } | StatementKind::For { body, .. } => {
                collect_local_names(body, names)
            }
            StatementKind::Block(inner) => collect_local_names(inner, names),
            _ => {}
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect;
    use crate::ir::{ExecutionType, OperationKind};
    use parallelme_syntax::parse;

    fn extract_source(source: &str) -> (ClassExtraction, TokenStream) {
        let stream = TokenStream::lex(source).expect("lexing should succeed");
        let unit = parse(&stream).expect("parsing should succeed");
        let catalog = UserLibraryCatalog::new();
        let table = collect::run(&catalog, &unit, &stream).expect("first pass should succeed");
        let extraction =
            run(&catalog, &unit, &stream, &table, 0).expect("second pass should succeed");
        (extraction, stream)
    }

    const FOREACH_SOURCE: &str = "package org.sample;\n\
         import org.parallelme.userlibrary.image.BitmapImage;\n\
         public class ImageOps {\n\
         \tpublic void run(Bitmap bitmap) {\n\
         \t\tfinal float k = 1.5f;\n\
         \t\tBitmapImage image = new BitmapImage(bitmap);\n\
         \t\timage.foreach((Pixel pixel) -> {\n\
         \t\t\tpixel.rgba.red = pixel.rgba.red * k;\n\
         \t\t});\n\
         \t\timage.toBitmap(bitmap);\n\
         \t}\n\
         }\n";

    #[test]
    fn test_extract_input_bind() {
        let (extraction, stream) = extract_source(FOREACH_SOURCE);
        let binds = &extraction.operations_and_binds.input_binds;
        assert_eq!(binds.len(), 1);
        let bind = &binds[0];
        assert_eq!(bind.sequence_index, 1);
        assert_eq!(bind.variable.name, "image");
        assert_eq!(bind.variable.type_name, "BitmapImage");
        assert_eq!(bind.arguments.len(), 1);
        assert!(matches!(&bind.arguments[0], Parameter::Variable(v) if v.name == "bitmap"));
        assert_eq!(stream.slice(&bind.declaration_range), "BitmapImage image =");
        assert_eq!(stream.slice(&bind.creation_range), "new BitmapImage(bitmap);");
    }

    #[test]
    fn test_extract_foreach_operation_with_final_capture() {
        let (extraction, _) = extract_source(FOREACH_SOURCE);
        let operations = &extraction.operations_and_binds.operations;
        assert_eq!(operations.len(), 1);
        let op = &operations[0];
        assert_eq!(op.kind, OperationKind::Foreach);
        assert_eq!(op.number, 1);
        assert_eq!(op.execution, ExecutionType::Parallel);
        assert_eq!(op.user_function.variable_argument().name, "pixel");
        assert_eq!(op.user_function.variable_argument().type_name, "Pixel");
        assert!(op.user_function.code.contains("pixel.rgba.red * k"));
        assert_eq!(op.external_variables.len(), 1);
        assert_eq!(op.external_variables[0].name, "k");
        assert!(op.external_variables[0].is_final());
    }

    #[test]
    fn test_extract_output_bind_assignment() {
        let (extraction, _) = extract_source(FOREACH_SOURCE);
        let output_binds = &extraction.operations_and_binds.output_binds;
        assert_eq!(output_binds.len(), 1);
        assert_eq!(output_binds[0].kind, OutputBindKind::Assignment);
        assert_eq!(output_binds[0].destination.name, "bitmap");
    }

    #[test]
    fn test_non_final_capture_goes_sequential() {
        let (extraction, _) = extract_source(
            "class A { void run(Bitmap b) {\n\
             float k = 2f;\n\
             BitmapImage image = new BitmapImage(b);\n\
             image.foreach((Pixel p) -> { p.rgba.red = p.rgba.red * k; });\n\
             } }",
        );
        let op = &extraction.operations_and_binds.operations[0];
        assert_eq!(op.execution, ExecutionType::Sequential);
    }

    #[test]
    fn test_free_variables_in_order_of_first_reference() {
        let (extraction, _) = extract_source(
            "class A { void run(int[] d) {\n\
             final int a = 1; final int b = 2; final int c = 3;\n\
             Array<Int32> arr = new Array<Int32>(d);\n\
             arr.foreach((Int32 v) -> { v.value = v.value * b + a * c + b; });\n\
             } }",
        );
        let names: Vec<&str> = extraction.operations_and_binds.operations[0]
            .external_variables
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_reduce_with_two_parameters() {
        let (extraction, _) = extract_source(
            "class A { void run(int[] d) {\n\
             Array<Int32> arr = new Array<Int32>(d);\n\
             arr.reduce((Int32 a, Int32 b) -> { return a + b; });\n\
             } }",
        );
        let op = &extraction.operations_and_binds.operations[0];
        assert_eq!(op.kind, OperationKind::Reduce);
        assert_eq!(op.user_function.arguments.len(), 2);
        assert_eq!(op.execution, ExecutionType::Parallel);
    }

    #[test]
    fn test_method_call_extraction_and_dedup() {
        let (extraction, _) = extract_source(
            "class A { int run(Bitmap b) {\n\
             BitmapImage image = new BitmapImage(b);\n\
             int w = image.getWidth();\n\
             return image.getWidth() + image.getHeight();\n\
             } }",
        );
        assert_eq!(extraction.method_calls.len(), 3);
        let width_indices: HashSet<u32> = extraction
            .method_calls
            .iter()
            .filter(|mc| mc.method_name == "getWidth")
            .map(|mc| mc.sequence_index)
            .collect();
        assert_eq!(width_indices.len(), 1, "same accessor shares one wrapper slot");
    }

    #[test]
    fn test_operation_inside_conditional() {
        let (extraction, _) = extract_source(
            "class A { void run(Bitmap b, boolean go) {\n\
             BitmapImage image = new BitmapImage(b);\n\
             if (go) { image.foreach((Pixel p) -> { p.rgba.red = 0f; }); }\n\
             } }",
        );
        assert_eq!(extraction.operations_and_binds.operations.len(), 1);
    }

    #[test]
    fn test_unrecognized_method_left_untouched() {
        let (extraction, _) = extract_source(
            "class A { void run(Bitmap b) {\n\
             BitmapImage image = new BitmapImage(b);\n\
             image.recycle();\n\
             } }",
        );
        assert!(extraction.operations_and_binds.operations.is_empty());
        assert!(extraction.method_calls.is_empty());
    }

    #[test]
    fn test_nested_creator_argument_fails() {
        let stream = TokenStream::lex(
            "class A { void run() { BitmapImage image = new BitmapImage(new Object()); } }",
        )
        .unwrap();
        let unit = parse(&stream).unwrap();
        let catalog = UserLibraryCatalog::new();
        let table = collect::run(&catalog, &unit, &stream).unwrap();
        let err = run(&catalog, &unit, &stream, &table, 0).unwrap_err();
        assert!(matches!(
            err,
            CompilationError::UnsupportedArgumentShape { .. }
        ));
    }

    #[test]
    fn test_no_user_library_means_empty_extraction() {
        let (extraction, _) = extract_source(
            "class A { int add(int a, int b) { return a + b; } }",
        );
        assert!(extraction.operations_and_binds.is_empty());
        assert!(extraction.method_calls.is_empty());
    }
}
