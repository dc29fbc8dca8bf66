//! First compiler pass: symbol collection.
//!
//! Walks a file's parse tree and populates the scoped symbol table — one
//! `Class` symbol per top-level class with nested `Method`, `Variable` and
//! `Creator` symbols, each carrying its token range. No user-library
//! semantics are interpreted here beyond tagging variables whose declared
//! type name the catalog recognizes; everything meaningful happens in the
//! second pass.

use crate::catalog::UserLibraryCatalog;
use crate::error::CompilationResult;
use crate::symbols::{SymbolId, SymbolKind, SymbolTable};
use parallelme_syntax::ast::*;
use parallelme_syntax::{TokenAddress, TokenStream};
use std::collections::HashMap;

/// Run the first pass over a parsed compilation unit.
pub fn run(
    catalog: &UserLibraryCatalog,
    unit: &CompilationUnit,
    stream: &TokenStream,
) -> CompilationResult<SymbolTable> {
    let mut collector = Collector {
        catalog,
        stream,
        table: SymbolTable::new(),
        name_counts: HashMap::new(),
    };
    for class in &unit.classes {
        collector.class(class)?;
    }
    Ok(collector.table)
}

struct Collector<'a> {
    catalog: &'a UserLibraryCatalog,
    stream: &'a TokenStream,
    table: SymbolTable,
    name_counts: HashMap<String, u32>,
}

impl<'a> Collector<'a> {
    /// Next identifier for a name; homonyms in different scopes get
    /// increasing identifiers.
    fn next_identifier(&mut self, name: &str) -> u32 {
        let count = self.name_counts.entry(name.to_string()).or_insert(0);
        let identifier = *count;
        *count += 1;
        identifier
    }

    fn class(&mut self, class: &ClassDecl) -> CompilationResult<()> {
        let identifier = self.next_identifier(&class.name);
        let scope = self.table.declare(
            self.table.root(),
            class.name.clone(),
            SymbolKind::Class { body: class.body },
            identifier,
            Some(class.address),
        )?;
        for field in &class.fields {
            self.declare_variable(
                scope,
                &field.name,
                &field.type_name,
                &field.type_parameters,
                field.modifier,
                field.address,
                field.address,
            )?;
        }
        for method in &class.methods {
            self.method(scope, method)?;
        }
        Ok(())
    }

    fn method(&mut self, class_scope: SymbolId, method: &MethodDecl) -> CompilationResult<()> {
        let params = method
            .params
            .iter()
            .map(|p| format!("{} {}", p.type_name, p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let signature = format!("{} {}({})", method.return_type, method.name, params);
        let identifier = self.next_identifier(&method.name);
        let scope = self.table.declare(
            class_scope,
            method.name.clone(),
            SymbolKind::Method { signature },
            identifier,
            Some(method.address),
        )?;
        for param in &method.params {
            self.declare_variable(
                scope,
                &param.name,
                &param.type_name,
                &param.type_parameters,
                Modifier::None,
                method.address,
                method.address,
            )?;
        }
        self.block(scope, &method.body)
    }

    fn block(&mut self, scope: SymbolId, block: &Block) -> CompilationResult<()> {
        for statement in &block.statements {
            self.statement(scope, statement)?;
        }
        Ok(())
    }

    fn statement(&mut self, scope: SymbolId, statement: &Statement) -> CompilationResult<()> {
        match &statement.kind {
            StatementKind::LocalVariable {
                modifier,
                type_name,
                type_parameters,
                name,
                init,
                decl_address,
            } => {
                self.declare_variable(
                    scope,
                    name,
                    type_name,
                    type_parameters,
                    *modifier,
                    statement.address,
                    *decl_address,
                )?;
                if let Some(init) = init {
                    if let ExprKind::Creator { .. } = &init.kind {
                        // Creation range runs from `new` through `;`.
                        let creation = self
                            .stream
                            .address(init.address.start, statement.address.stop);
                        self.declare_creator(scope, name, init, creation)?;
                    }
                }
            }
            StatementKind::Expression(expr) => {
                if let ExprKind::Assign { target, value } = &expr.kind {
                    if let (Some(name), ExprKind::Creator { .. }) =
                        (target.as_identifier(), &value.kind)
                    {
                        self.declare_creator(scope, name, value, statement.address)?;
                    }
                }
            }
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.block(scope, then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.block(scope, else_branch)?;
                }
            }
            StatementKind::While { body, .. } => self.block(scope, body)?,
            StatementKind::For { body, .. } => self.block(scope, body)?,
            StatementKind::Block(inner) => self.block(scope, inner)?,
            StatementKind::Return(_) => {}
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn declare_variable(
        &mut self,
        scope: SymbolId,
        name: &str,
        type_name: &str,
        type_parameters: &[String],
        modifier: Modifier,
        address: TokenAddress,
        statement_address: TokenAddress,
    ) -> CompilationResult<SymbolId> {
        let identifier = self.next_identifier(name);
        self.table.declare(
            scope,
            name.to_string(),
            SymbolKind::Variable {
                type_name: type_name.to_string(),
                type_parameter: type_parameters.first().cloned(),
                modifier,
                user_library: self.catalog.recognizes(type_name),
                statement_address,
            },
            identifier,
            Some(address),
        )
    }

    fn declare_creator(
        &mut self,
        scope: SymbolId,
        attributed_object: &str,
        creator: &Expr,
        statement_address: TokenAddress,
    ) -> CompilationResult<()> {
        let ExprKind::Creator {
            type_name, args, ..
        } = &creator.kind
        else {
            return Ok(());
        };
        let identifier = self.next_identifier(type_name);
        let creator_id = self.table.declare(
            scope,
            type_name.clone(),
            SymbolKind::Creator {
                attributed_object: attributed_object.to_string(),
                arguments: Vec::new(),
                statement_address,
            },
            identifier,
            Some(creator.address),
        )?;
        let mut argument_ids = Vec::with_capacity(args.len());
        for arg in args {
            argument_ids.push(self.creator_argument(creator_id, arg)?);
        }
        self.table.attach_creator_arguments(creator_id, argument_ids);
        Ok(())
    }

    /// Convert a creator argument into its symbol. Nested creators and
    /// lambdas get a `Creator` marker; the second pass rejects them.
    fn creator_argument(&mut self, creator: SymbolId, arg: &Expr) -> CompilationResult<SymbolId> {
        let text = self.stream.slice(&arg.address).to_string();
        let kind = match &arg.kind {
            ExprKind::Literal { kind, text } => SymbolKind::Literal {
                kind: *kind,
                value: text.clone(),
            },
            ExprKind::Creator { .. } | ExprKind::Lambda { .. } => SymbolKind::Creator {
                attributed_object: String::new(),
                arguments: Vec::new(),
                statement_address: arg.address,
            },
            _ => SymbolKind::Expression { text: text.clone() },
        };
        let identifier = self.next_identifier(&text);
        self.table
            .declare(creator, text, kind, identifier, Some(arg.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolFilter;
    use parallelme_syntax::parse;

    fn collect_source(source: &str) -> (SymbolTable, TokenStream) {
        let stream = TokenStream::lex(source).expect("lexing should succeed");
        let unit = parse(&stream).expect("parsing should succeed");
        let catalog = UserLibraryCatalog::new();
        let table = run(&catalog, &unit, &stream).expect("first pass should succeed");
        (table, stream)
    }

    #[test]
    fn test_collect_class_method_variable() {
        let (table, _) = collect_source(
            "public class ImageOps { public void run(Bitmap bitmap) { final float k = 2f; } }",
        );
        let root = table.root();
        let classes = table.lookup_in_scope(root, "ImageOps", SymbolFilter::Class);
        assert_eq!(classes.len(), 1);
        let methods = table.lookup_in_scope(classes[0], "run", SymbolFilter::Method);
        assert_eq!(methods.len(), 1);
        let vars = table.lookup_in_scope(methods[0], "k", SymbolFilter::Variable);
        assert_eq!(vars.len(), 1);
        match &table.data(vars[0]).kind {
            SymbolKind::Variable {
                type_name,
                modifier,
                user_library,
                ..
            } => {
                assert_eq!(type_name, "float");
                assert!(modifier.is_final());
                assert!(!user_library);
            }
            other => panic!("expected variable, got {:?}", other),
        }
    }

    #[test]
    fn test_collect_user_library_variable_and_creator() {
        let (table, stream) = collect_source(
            "class A { void run(Bitmap b) { BitmapImage image = new BitmapImage(b); } }",
        );
        let root = table.root();
        let class = table.lookup_in_scope(root, "A", SymbolFilter::Class)[0];
        let creators = table.collect(class, SymbolFilter::Creator, true);
        assert_eq!(creators.len(), 1);
        match &table.data(creators[0]).kind {
            SymbolKind::Creator {
                attributed_object,
                arguments,
                statement_address,
            } => {
                assert_eq!(attributed_object, "image");
                assert_eq!(arguments.len(), 1);
                assert_eq!(stream.slice(statement_address), "new BitmapImage(b);");
            }
            other => panic!("expected creator, got {:?}", other),
        }
        let method = table.lookup_in_scope(class, "run", SymbolFilter::Method)[0];
        let image = table
            .lookup_upward(method, "image", SymbolFilter::UserLibraryVariable)
            .expect("image should be recognized");
        assert!(matches!(
            table.data(image).kind,
            SymbolKind::Variable { user_library: true, .. }
        ));
    }

    #[test]
    fn test_creator_in_nested_block() {
        let (table, _) = collect_source(
            "class A { void run(int[] d) { if (d != null) { Array<Int32> a = new Array<Int32>(d); } } }",
        );
        let class = table.lookup_in_scope(table.root(), "A", SymbolFilter::Class)[0];
        assert_eq!(table.collect(class, SymbolFilter::Creator, true).len(), 1);
    }

    #[test]
    fn test_homonyms_get_distinct_identifiers() {
        let (table, _) = collect_source(
            "class A { void f() { int x = 1; } void g() { int x = 2; } }",
        );
        let class = table.lookup_in_scope(table.root(), "A", SymbolFilter::Class)[0];
        let f = table.lookup_in_scope(class, "f", SymbolFilter::Method)[0];
        let g = table.lookup_in_scope(class, "g", SymbolFilter::Method)[0];
        let x_in_f = table.lookup_in_scope(f, "x", SymbolFilter::Variable)[0];
        let x_in_g = table.lookup_in_scope(g, "x", SymbolFilter::Variable)[0];
        assert_ne!(table.data(x_in_f).identifier, table.data(x_in_g).identifier);
    }
}
