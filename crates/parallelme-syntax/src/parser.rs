//! Hand-written recursive descent parser for the host-language subset.
//!
//! Produces [`CompilationUnit`] parse trees over a [`TokenStream`]. The
//! grammar covers what user-library analysis needs: package/import headers,
//! classes, methods, local declarations, creators, method calls and typed
//! lambda bodies. Statement-level constructs the compiler never edits
//! (for-headers, arbitrary operator soup) are parsed just enough to keep
//! their token ranges intact.

use crate::address::TokenAddress;
use crate::ast::*;
use crate::stream::TokenStream;
use crate::token::Token;
use std::fmt;

/// Parse failure with source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Kind of parse error
    pub kind: ParseErrorKind,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Human-readable message
    pub message: String,
}

/// Category of parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A specific token was expected and something else was found
    UnexpectedToken,
    /// Input ended while a construct was incomplete
    UnexpectedEof,
    /// Tokens present but structurally invalid
    InvalidSyntax,
}

impl ParseError {
    fn expected(expected: Token, found: Option<Token>, line: u32, column: u32) -> Self {
        let (kind, message) = match found {
            Some(tok) => (
                ParseErrorKind::UnexpectedToken,
                format!("expected '{}', found '{}'", expected, tok),
            ),
            None => (
                ParseErrorKind::UnexpectedEof,
                format!("expected '{}', found end of input", expected),
            ),
        };
        Self {
            kind,
            line,
            column,
            message,
        }
    }

    fn unexpected(found: Option<Token>, context: &str, line: u32, column: u32) -> Self {
        let (kind, message) = match found {
            Some(tok) => (
                ParseErrorKind::UnexpectedToken,
                format!("unexpected '{}' {}", tok, context),
            ),
            None => (
                ParseErrorKind::UnexpectedEof,
                format!("unexpected end of input {}", context),
            ),
        };
        Self {
            kind,
            line,
            column,
            message,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse a token stream into a compilation unit.
pub fn parse(stream: &TokenStream) -> Result<CompilationUnit, ParseError> {
    Parser::new(stream).compilation_unit()
}

struct Parser<'a> {
    stream: &'a TokenStream,
    pos: u32,
}

impl<'a> Parser<'a> {
    fn new(stream: &'a TokenStream) -> Self {
        Self { stream, pos: 0 }
    }

    // === Cursor primitives ===

    fn peek(&self) -> Option<Token> {
        self.stream.get(self.pos).map(|t| t.token)
    }

    fn peek_nth(&self, n: u32) -> Option<Token> {
        self.stream.get(self.pos + n).map(|t| t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, expected: Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<u32, ParseError> {
        if self.check(expected) {
            let index = self.pos;
            self.pos += 1;
            Ok(index)
        } else {
            let (line, column) = self.position();
            Err(ParseError::expected(expected, self.peek(), line, column))
        }
    }

    fn position(&self) -> (u32, u32) {
        match self.stream.get(self.pos) {
            Some(tok) => (tok.line, tok.column),
            None => match self.stream.get(self.stream.len().saturating_sub(1) as u32) {
                Some(last) => (last.line, last.column),
                None => (1, 1),
            },
        }
    }

    fn text(&self, index: u32) -> &str {
        self.stream.text(index)
    }

    fn address_from(&self, start: u32) -> TokenAddress {
        debug_assert!(self.pos > start, "empty token address");
        self.stream.address(start, self.pos - 1)
    }

    fn fail(&self, context: &str) -> ParseError {
        let (line, column) = self.position();
        ParseError::unexpected(self.peek(), context, line, column)
    }

    // === Top level ===

    fn compilation_unit(&mut self) -> Result<CompilationUnit, ParseError> {
        let package = if self.check(Token::Package) {
            Some(self.package_decl()?)
        } else {
            None
        };
        let mut imports = Vec::new();
        while self.check(Token::Import) {
            imports.push(self.import_decl()?);
        }
        let mut classes = Vec::new();
        while self.peek().is_some() {
            classes.push(self.class_decl()?);
        }
        Ok(CompilationUnit {
            package,
            imports,
            classes,
        })
    }

    fn package_decl(&mut self) -> Result<PackageDecl, ParseError> {
        let start = self.pos;
        self.expect(Token::Package)?;
        let name = self.dotted_name()?;
        self.expect(Token::Semicolon)?;
        Ok(PackageDecl {
            name,
            address: self.address_from(start),
        })
    }

    fn import_decl(&mut self) -> Result<ImportDecl, ParseError> {
        let start = self.pos;
        self.expect(Token::Import)?;
        let mut path = self.dotted_name()?;
        if self.eat(Token::Dot) {
            self.expect(Token::Star)?;
            path.push_str(".*");
        }
        self.expect(Token::Semicolon)?;
        Ok(ImportDecl {
            path,
            address: self.address_from(start),
        })
    }

    fn dotted_name(&mut self) -> Result<String, ParseError> {
        let first = self.expect(Token::Identifier)?;
        let mut name = self.text(first).to_string();
        while self.check(Token::Dot) && self.peek_nth(1) == Some(Token::Identifier) {
            self.advance();
            let part = self.expect(Token::Identifier)?;
            name.push('.');
            name.push_str(self.text(part));
        }
        Ok(name)
    }

    fn skip_modifiers(&mut self) -> Modifier {
        let mut modifier = Modifier::None;
        loop {
            match self.peek() {
                Some(Token::Public)
                | Some(Token::Private)
                | Some(Token::Protected)
                | Some(Token::Static)
                | Some(Token::Native) => {
                    self.advance();
                }
                Some(Token::Final) => {
                    self.advance();
                    modifier = Modifier::Final;
                }
                Some(Token::At) => {
                    // Annotation: `@Name`
                    self.advance();
                    let _ = self.expect(Token::Identifier);
                }
                _ => return modifier,
            }
        }
    }

    fn class_decl(&mut self) -> Result<ClassDecl, ParseError> {
        let start = self.pos;
        self.skip_modifiers();
        self.expect(Token::Class)?;
        let name_index = self.expect(Token::Identifier)?;
        let name = self.text(name_index).to_string();
        let body_start = self.pos;
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(Token::RBrace) {
            if self.peek().is_none() {
                return Err(self.fail("inside class body"));
            }
            self.class_member(&mut fields, &mut methods)?;
        }
        self.expect(Token::RBrace)?;
        Ok(ClassDecl {
            name,
            address: self.address_from(start),
            body: self.address_from(body_start),
            fields,
            methods,
        })
    }

    fn class_member(
        &mut self,
        fields: &mut Vec<FieldDecl>,
        methods: &mut Vec<MethodDecl>,
    ) -> Result<(), ParseError> {
        let start = self.pos;
        let modifier = self.skip_modifiers();
        let (type_name, type_parameters) = self.type_name()?;
        if self.check(Token::LParen) {
            // Constructor: the "type" is actually the class name.
            let method = self.method_rest(start, type_name.clone(), "void".to_string())?;
            methods.push(method);
            return Ok(());
        }
        let name_index = self.expect(Token::Identifier)?;
        let name = self.text(name_index).to_string();
        if self.check(Token::LParen) {
            let method = self.method_rest(start, name, type_name)?;
            methods.push(method);
        } else {
            let init = if self.eat(Token::Assign) {
                Some(self.expression()?)
            } else {
                None
            };
            self.expect(Token::Semicolon)?;
            fields.push(FieldDecl {
                modifier,
                type_name,
                type_parameters,
                name,
                init,
                address: self.address_from(start),
            });
        }
        Ok(())
    }

    fn method_rest(
        &mut self,
        start: u32,
        name: String,
        return_type: String,
    ) -> Result<MethodDecl, ParseError> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                params.push(self.typed_param()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        let body = self.block()?;
        Ok(MethodDecl {
            name,
            return_type,
            params,
            body,
            address: self.address_from(start),
        })
    }

    fn typed_param(&mut self) -> Result<Param, ParseError> {
        let (type_name, type_parameters) = self.type_name()?;
        let name_index = self.expect(Token::Identifier)?;
        Ok(Param {
            type_name,
            type_parameters,
            name: self.text(name_index).to_string(),
        })
    }

    /// Parse a type: primitive or identifier, optional `<...>` parameters,
    /// optional `[]` suffixes folded into the name (`float[]`).
    fn type_name(&mut self) -> Result<(String, Vec<String>), ParseError> {
        let tok = self.peek().ok_or_else(|| self.fail("expecting a type"))?;
        if !tok.starts_type() {
            return Err(self.fail("expecting a type"));
        }
        let index = self.pos;
        self.advance();
        let mut name = self.text(index).to_string();
        let mut type_parameters = Vec::new();
        if self.check(Token::Lt) {
            self.advance();
            loop {
                let (param, _) = self.type_name()?;
                type_parameters.push(param);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::Gt)?;
        }
        while self.check(Token::LBracket) && self.peek_nth(1) == Some(Token::RBracket) {
            self.advance();
            self.advance();
            name.push_str("[]");
        }
        Ok((name, type_parameters))
    }

    // === Statements ===

    fn block(&mut self) -> Result<Block, ParseError> {
        let start = self.pos;
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(Token::RBrace) {
            if self.peek().is_none() {
                return Err(self.fail("inside block"));
            }
            statements.push(self.statement()?);
        }
        self.expect(Token::RBrace)?;
        Ok(Block {
            statements,
            address: self.address_from(start),
        })
    }

    /// A single statement, wrapped into a one-statement block when a
    /// control-flow body omits braces.
    fn statement_as_block(&mut self) -> Result<Block, ParseError> {
        if self.check(Token::LBrace) {
            return self.block();
        }
        let statement = self.statement()?;
        let address = statement.address;
        Ok(Block {
            statements: vec![statement],
            address,
        })
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(Token::LBrace) => {
                let block = self.block()?;
                let address = block.address;
                Ok(Statement {
                    kind: StatementKind::Block(Box::new(block)),
                    address,
                })
            }
            Some(Token::Return) => {
                self.advance();
                let value = if self.check(Token::Semicolon) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(Token::Semicolon)?;
                Ok(Statement {
                    kind: StatementKind::Return(value),
                    address: self.address_from(start),
                })
            }
            Some(Token::If) => {
                self.advance();
                self.expect(Token::LParen)?;
                let condition = self.expression()?;
                self.expect(Token::RParen)?;
                let then_branch = Box::new(self.statement_as_block()?);
                let else_branch = if self.eat(Token::Else) {
                    Some(Box::new(self.statement_as_block()?))
                } else {
                    None
                };
                Ok(Statement {
                    kind: StatementKind::If {
                        condition,
                        then_branch,
                        else_branch,
                    },
                    address: self.address_from(start),
                })
            }
            Some(Token::While) => {
                self.advance();
                self.expect(Token::LParen)?;
                let condition = self.expression()?;
                self.expect(Token::RParen)?;
                let body = Box::new(self.statement_as_block()?);
                Ok(Statement {
                    kind: StatementKind::While { condition, body },
                    address: self.address_from(start),
                })
            }
            Some(Token::For) => {
                self.advance();
                let header_start = self.pos;
                self.expect(Token::LParen)?;
                let mut depth = 1u32;
                while depth > 0 {
                    match self.advance() {
                        Some(Token::LParen) => depth += 1,
                        Some(Token::RParen) => depth -= 1,
                        Some(_) => {}
                        None => return Err(self.fail("inside for header")),
                    }
                }
                let header = self.address_from(header_start);
                let body = Box::new(self.statement_as_block()?);
                Ok(Statement {
                    kind: StatementKind::For { header, body },
                    address: self.address_from(start),
                })
            }
            Some(_) if self.at_local_declaration() => self.local_variable(start),
            Some(_) => {
                let expr = self.expression()?;
                self.expect(Token::Semicolon)?;
                Ok(Statement {
                    kind: StatementKind::Expression(expr),
                    address: self.address_from(start),
                })
            }
            None => Err(self.fail("expecting a statement")),
        }
    }

    /// Lookahead: does a local variable declaration start here?
    ///
    /// `final ...`, a primitive type, `Ident Ident`, `Ident [] Ident` and
    /// `Ident < ... > Ident` all open declarations; anything else is an
    /// expression statement.
    fn at_local_declaration(&self) -> bool {
        match self.peek() {
            Some(Token::Final) => true,
            Some(tok) if tok.is_primitive_type() => true,
            Some(Token::Identifier) => {
                let mut n = 1;
                if self.peek_nth(n) == Some(Token::Lt) {
                    // Scan a simple `<A, B>` parameter list.
                    n += 1;
                    loop {
                        match self.peek_nth(n) {
                            Some(Token::Identifier) | Some(Token::Comma) => n += 1,
                            Some(tok) if tok.is_primitive_type() => n += 1,
                            Some(Token::Gt) => {
                                n += 1;
                                break;
                            }
                            _ => return false,
                        }
                    }
                }
                while self.peek_nth(n) == Some(Token::LBracket)
                    && self.peek_nth(n + 1) == Some(Token::RBracket)
                {
                    n += 2;
                }
                self.peek_nth(n) == Some(Token::Identifier)
            }
            _ => false,
        }
    }

    fn local_variable(&mut self, start: u32) -> Result<Statement, ParseError> {
        let modifier = if self.eat(Token::Final) {
            Modifier::Final
        } else {
            Modifier::None
        };
        let (type_name, type_parameters) = self.type_name()?;
        let name_index = self.expect(Token::Identifier)?;
        let name = self.text(name_index).to_string();
        let (init, decl_stop) = if self.check(Token::Assign) {
            let assign_index = self.expect(Token::Assign)?;
            (Some(self.expression()?), assign_index)
        } else {
            (None, 0)
        };
        let semicolon = self.expect(Token::Semicolon)?;
        let decl_address = if init.is_some() {
            self.stream.address(start, decl_stop)
        } else {
            self.stream.address(start, semicolon)
        };
        Ok(Statement {
            kind: StatementKind::LocalVariable {
                modifier,
                type_name,
                type_parameters,
                name,
                init,
                decl_address,
            },
            address: self.address_from(start),
        })
    }

    // === Expressions ===

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let left = self.binary_or()?;
        if self.check(Token::Assign) {
            self.advance();
            let value = self.expression()?;
            return Ok(Expr {
                kind: ExprKind::Assign {
                    target: Box::new(left),
                    value: Box::new(value),
                },
                address: self.address_from(start),
            });
        }
        Ok(left)
    }

    fn binary_or(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut left = self.binary_and()?;
        while self.check(Token::OrOr) {
            self.advance();
            let right = self.binary_and()?;
            left = self.make_binary(start, "||", left, right);
        }
        Ok(left)
    }

    fn binary_and(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut left = self.equality()?;
        while self.check(Token::AndAnd) {
            self.advance();
            let right = self.equality()?;
            left = self.make_binary(start, "&&", left, right);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => "==",
                Some(Token::Ne) => "!=",
                _ => break,
            };
            self.advance();
            let right = self.relational()?;
            left = self.make_binary(start, op, left, right);
        }
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => "<",
                Some(Token::Gt) => ">",
                Some(Token::Le) => "<=",
                Some(Token::Ge) => ">=",
                _ => break,
            };
            self.advance();
            let right = self.additive()?;
            left = self.make_binary(start, op, left, right);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => "+",
                Some(Token::Minus) => "-",
                _ => break,
            };
            self.advance();
            let right = self.multiplicative()?;
            left = self.make_binary(start, op, left, right);
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => "*",
                Some(Token::Slash) => "/",
                Some(Token::Percent) => "%",
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = self.make_binary(start, op, left, right);
        }
        Ok(left)
    }

    fn make_binary(&self, start: u32, op: &'static str, left: Expr, right: Expr) -> Expr {
        Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            address: self.address_from(start),
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let op = match self.peek() {
            Some(Token::Bang) => Some("!"),
            Some(Token::Minus) => Some("-"),
            Some(Token::PlusPlus) => Some("++"),
            Some(Token::MinusMinus) => Some("--"),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                address: self.address_from(start),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name_index = self.expect(Token::Identifier)?;
                    let name = self.text(name_index).to_string();
                    if self.check(Token::LParen) {
                        let args = self.call_arguments()?;
                        expr = Expr {
                            kind: ExprKind::MethodCall {
                                receiver: Some(Box::new(expr)),
                                name,
                                args,
                            },
                            address: self.address_from(start),
                        };
                    } else {
                        expr = Expr {
                            kind: ExprKind::FieldAccess {
                                object: Box::new(expr),
                                field: name,
                            },
                            address: self.address_from(start),
                        };
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        address: self.address_from(start),
                    };
                }
                Some(Token::PlusPlus) => {
                    self.advance();
                    expr = Expr {
                        kind: ExprKind::Postfix {
                            op: "++",
                            operand: Box::new(expr),
                        },
                        address: self.address_from(start),
                    };
                }
                Some(Token::MinusMinus) => {
                    self.advance();
                    expr = Expr {
                        kind: ExprKind::Postfix {
                            op: "--",
                            operand: Box::new(expr),
                        },
                        address: self.address_from(start),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(Token::IntLiteral) => self.literal(LiteralKind::Int),
            Some(Token::FloatLiteral) => self.literal(LiteralKind::Float),
            Some(Token::CharLiteral) => self.literal(LiteralKind::Char),
            Some(Token::StringLiteral) => self.literal(LiteralKind::Str),
            Some(Token::True) | Some(Token::False) => self.literal(LiteralKind::Boolean),
            Some(Token::Null) | Some(Token::This) => {
                let index = self.pos;
                self.advance();
                Ok(Expr {
                    kind: ExprKind::Identifier(self.text(index).to_string()),
                    address: self.address_from(start),
                })
            }
            Some(Token::Identifier) => {
                let index = self.pos;
                self.advance();
                let name = self.text(index).to_string();
                if self.check(Token::LParen) {
                    let args = self.call_arguments()?;
                    Ok(Expr {
                        kind: ExprKind::MethodCall {
                            receiver: None,
                            name,
                            args,
                        },
                        address: self.address_from(start),
                    })
                } else {
                    Ok(Expr {
                        kind: ExprKind::Identifier(name),
                        address: self.address_from(start),
                    })
                }
            }
            Some(Token::New) => self.creator(),
            Some(Token::LParen) => {
                if self.at_lambda() {
                    self.lambda()
                } else {
                    self.advance();
                    let inner = self.expression()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr {
                        kind: ExprKind::Paren(Box::new(inner)),
                        address: self.address_from(start),
                    })
                }
            }
            _ => Err(self.fail("expecting an expression")),
        }
    }

    fn literal(&mut self, kind: LiteralKind) -> Result<Expr, ParseError> {
        let start = self.pos;
        let index = self.pos;
        self.advance();
        Ok(Expr {
            kind: ExprKind::Literal {
                kind,
                text: self.text(index).to_string(),
            },
            address: self.address_from(start),
        })
    }

    fn creator(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.expect(Token::New)?;
        let (type_name, type_parameters) = self.type_name()?;
        let args = self.call_arguments()?;
        Ok(Expr {
            kind: ExprKind::Creator {
                type_name,
                type_parameters,
                args,
            },
            address: self.address_from(start),
        })
    }

    /// Lookahead from a `(`: scan to the matching `)` and check for `->`.
    fn at_lambda(&self) -> bool {
        debug_assert_eq!(self.peek(), Some(Token::LParen));
        let mut depth = 0u32;
        let mut n = 0;
        loop {
            match self.peek_nth(n) {
                Some(Token::LParen) => depth += 1,
                Some(Token::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_nth(n + 1) == Some(Token::Arrow);
                    }
                }
                Some(_) => {}
                None => return false,
            }
            n += 1;
        }
    }

    fn lambda(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos;
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(Token::RParen) {
            loop {
                params.push(self.lambda_param()?);
                if !self.eat(Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        self.expect(Token::Arrow)?;
        let body = self.block()?;
        Ok(Expr {
            kind: ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            address: self.address_from(start),
        })
    }

    /// Lambda parameter: `Type name` or a bare `name`.
    fn lambda_param(&mut self) -> Result<Param, ParseError> {
        if self.check(Token::Identifier)
            && matches!(
                self.peek_nth(1),
                Some(Token::Comma) | Some(Token::RParen)
            )
        {
            let index = self.expect(Token::Identifier)?;
            return Ok(Param {
                type_name: String::new(),
                type_parameters: Vec::new(),
                name: self.text(index).to_string(),
            });
        }
        self.typed_param()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_source(source: &str) -> CompilationUnit {
        let stream = TokenStream::lex(source).expect("lexing should succeed");
        parse(&stream).expect("parsing should succeed")
    }

    #[test]
    fn test_parse_package_and_imports() {
        let unit = parse_source(
            "package org.sample;\nimport android.graphics.Bitmap;\npublic class A { }",
        );
        assert_eq!(unit.package.as_ref().unwrap().name, "org.sample");
        assert_eq!(unit.imports.len(), 1);
        assert_eq!(unit.imports[0].path, "android.graphics.Bitmap");
        assert_eq!(unit.classes.len(), 1);
        assert_eq!(unit.classes[0].name, "A");
    }

    #[test]
    fn test_parse_method_and_locals() {
        let unit = parse_source(
            "class A { public void run(Bitmap bitmap) { final float k = 1.5f; int n; } }",
        );
        let method = &unit.classes[0].methods[0];
        assert_eq!(method.name, "run");
        assert_eq!(method.params[0].type_name, "Bitmap");
        assert_eq!(method.body.statements.len(), 2);
        match &method.body.statements[0].kind {
            StatementKind::LocalVariable {
                modifier,
                type_name,
                name,
                init,
                ..
            } => {
                assert!(modifier.is_final());
                assert_eq!(type_name, "float");
                assert_eq!(name, "k");
                assert!(init.is_some());
            }
            other => panic!("expected local variable, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_creator_with_type_parameter() {
        let unit =
            parse_source("class A { void run(int[] data) { Array<Int32> a = new Array<Int32>(data); } }");
        let method = &unit.classes[0].methods[0];
        match &method.body.statements[0].kind {
            StatementKind::LocalVariable {
                type_name,
                type_parameters,
                init: Some(init),
                ..
            } => {
                assert_eq!(type_name, "Array");
                assert_eq!(type_parameters, &vec!["Int32".to_string()]);
                assert!(matches!(init.kind, ExprKind::Creator { .. }));
            }
            other => panic!("expected declaration with creator, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_lambda_operation() {
        let unit = parse_source(
            "class A { void run() { image.foreach((Pixel pixel) -> { pixel.rgba.red = 1.0f; }); } }",
        );
        let method = &unit.classes[0].methods[0];
        match &method.body.statements[0].kind {
            StatementKind::Expression(expr) => match &expr.kind {
                ExprKind::MethodCall { receiver, name, args } => {
                    assert_eq!(receiver.as_ref().unwrap().as_identifier(), Some("image"));
                    assert_eq!(name, "foreach");
                    match &args[0].kind {
                        ExprKind::Lambda { params, body } => {
                            assert_eq!(params[0].type_name, "Pixel");
                            assert_eq!(params[0].name, "pixel");
                            assert_eq!(body.statements.len(), 1);
                        }
                        other => panic!("expected lambda argument, got {:?}", other),
                    }
                }
                other => panic!("expected method call, got {:?}", other),
            },
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_two_parameter_lambda() {
        let unit = parse_source(
            "class A { void run() { sum.reduce((Int32 a, Int32 b) -> { return a + b; }); } }",
        );
        let method = &unit.classes[0].methods[0];
        match &method.body.statements[0].kind {
            StatementKind::Expression(Expr {
                kind: ExprKind::MethodCall { args, .. },
                ..
            }) => match &args[0].kind {
                ExprKind::Lambda { params, .. } => assert_eq!(params.len(), 2),
                other => panic!("expected lambda, got {:?}", other),
            },
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_declaration_address_splits_at_assign() {
        let source = "class A { void run(Bitmap b) { BitmapImage image = new BitmapImage(b); } }";
        let stream = TokenStream::lex(source).unwrap();
        let unit = parse(&stream).unwrap();
        match &unit.classes[0].methods[0].body.statements[0].kind {
            StatementKind::LocalVariable { decl_address, .. } => {
                assert_eq!(stream.slice(decl_address), "BitmapImage image =");
            }
            other => panic!("expected local variable, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_control_flow() {
        let unit = parse_source(
            "class A { void run(int n) { if (n > 0) { n = n - 1; } else { n = 0; } \
             for (int i = 0; i < n; i++) { n = n + 1; } while (n > 0) { n--; } } }",
        );
        assert_eq!(unit.classes[0].methods[0].body.statements.len(), 3);
    }

    #[test]
    fn test_parse_error_reports_position() {
        let stream = TokenStream::lex("class A { void run( { } }").unwrap();
        let err = parse(&stream).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
        assert_eq!(err.line, 1);
    }
}
