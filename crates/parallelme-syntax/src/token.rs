//! Lexical analysis for the analyzed host language.
//!
//! Tokenizes the Java subset the user library lives in, using logos.
//!
//! # Design
//!
//! - `Token` — keywords, operators, delimiters and literal classes
//! - Whitespace and comments are stripped during lexing (not tokens); the
//!   surrounding [`TokenStream`](crate::TokenStream) keeps byte ranges so the
//!   skipped trivia can be recovered verbatim when rewriting
//! - Literal and identifier tokens carry no text; their spelling is read back
//!   through the token's byte range

use logos::Logos;
use std::fmt;

/// Host-language token.
///
/// Only the subset of Java needed to recognize user-library usage is
/// distinguished; everything else must simply lex, since unedited regions
/// pass through the compiler untouched.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")] // Skip whitespace
#[logos(skip r"//[^\n]*")] // Skip line comments
#[logos(skip r"/\*([^*]|\*[^/])*\*+/")] // Skip block comments
pub enum Token {
    // === Keywords ===
    /// Keyword `package`
    #[token("package")]
    Package,
    /// Keyword `import`
    #[token("import")]
    Import,
    /// Keyword `class`
    #[token("class")]
    Class,
    /// Keyword `interface`
    #[token("interface")]
    Interface,
    /// Keyword `public`
    #[token("public")]
    Public,
    /// Keyword `private`
    #[token("private")]
    Private,
    /// Keyword `protected`
    #[token("protected")]
    Protected,
    /// Keyword `static`
    #[token("static")]
    Static,
    /// Keyword `final`
    #[token("final")]
    Final,
    /// Keyword `native`
    #[token("native")]
    Native,
    /// Keyword `new`
    #[token("new")]
    New,
    /// Keyword `return`
    #[token("return")]
    Return,
    /// Keyword `if`
    #[token("if")]
    If,
    /// Keyword `else`
    #[token("else")]
    Else,
    /// Keyword `while`
    #[token("while")]
    While,
    /// Keyword `for`
    #[token("for")]
    For,
    /// Keyword `this`
    #[token("this")]
    This,
    /// Keyword `null`
    #[token("null")]
    Null,
    /// Keyword `void`
    #[token("void")]
    Void,

    // Primitive type keywords
    /// Keyword `boolean`
    #[token("boolean")]
    Boolean,
    /// Keyword `byte`
    #[token("byte")]
    Byte,
    /// Keyword `char`
    #[token("char")]
    Char,
    /// Keyword `short`
    #[token("short")]
    Short,
    /// Keyword `int`
    #[token("int")]
    Int,
    /// Keyword `long`
    #[token("long")]
    Long,
    /// Keyword `float`
    #[token("float")]
    Float,
    /// Keyword `double`
    #[token("double")]
    Double,

    // === Delimiters ===
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `(`
    #[token("(")]
    LParen,
    /// `)`
    #[token(")")]
    RParen,
    /// `[`
    #[token("[")]
    LBracket,
    /// `]`
    #[token("]")]
    RBracket,
    /// `;`
    #[token(";")]
    Semicolon,
    /// `,`
    #[token(",")]
    Comma,
    /// `.`
    #[token(".")]
    Dot,
    /// `@`
    #[token("@")]
    At,

    // === Operators ===
    /// `->`
    #[token("->")]
    Arrow,
    /// `=`
    #[token("=")]
    Assign,
    /// `==`
    #[token("==")]
    Eq,
    /// `!=`
    #[token("!=")]
    Ne,
    /// `<`
    #[token("<")]
    Lt,
    /// `>`
    #[token(">")]
    Gt,
    /// `<=`
    #[token("<=")]
    Le,
    /// `>=`
    #[token(">=")]
    Ge,
    /// `+`
    #[token("+")]
    Plus,
    /// `-`
    #[token("-")]
    Minus,
    /// `*`
    #[token("*")]
    Star,
    /// `/`
    #[token("/")]
    Slash,
    /// `%`
    #[token("%")]
    Percent,
    /// `!`
    #[token("!")]
    Bang,
    /// `&&`
    #[token("&&")]
    AndAnd,
    /// `||`
    #[token("||")]
    OrOr,
    /// `++`
    #[token("++")]
    PlusPlus,
    /// `--`
    #[token("--")]
    MinusMinus,
    /// `?`
    #[token("?")]
    Question,
    /// `:`
    #[token(":")]
    Colon,

    // === Literals ===
    /// `true`
    #[token("true")]
    True,
    /// `false`
    #[token("false")]
    False,
    /// Floating-point literal (`1.5`, `0.5f`, `2f`)
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[fFdD]?|[0-9]+[fFdD]")]
    FloatLiteral,
    /// Integer literal
    #[regex(r"[0-9]+[lL]?")]
    IntLiteral,
    /// Character literal
    #[regex(r"'([^'\\\n]|\\.)'")]
    CharLiteral,
    /// String literal
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLiteral,

    /// Identifier (`$` is a legal Java identifier character)
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Identifier,
}

impl Token {
    /// Whether this token is a primitive type keyword.
    pub fn is_primitive_type(self) -> bool {
        matches!(
            self,
            Token::Boolean
                | Token::Byte
                | Token::Char
                | Token::Short
                | Token::Int
                | Token::Long
                | Token::Float
                | Token::Double
        )
    }

    /// Whether this token can start a type name (primitive keyword, `void`
    /// or an identifier).
    pub fn starts_type(self) -> bool {
        self.is_primitive_type() || matches!(self, Token::Identifier | Token::Void)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Package => "package",
            Token::Import => "import",
            Token::Class => "class",
            Token::Interface => "interface",
            Token::Public => "public",
            Token::Private => "private",
            Token::Protected => "protected",
            Token::Static => "static",
            Token::Final => "final",
            Token::Native => "native",
            Token::New => "new",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::For => "for",
            Token::This => "this",
            Token::Null => "null",
            Token::Void => "void",
            Token::Boolean => "boolean",
            Token::Byte => "byte",
            Token::Char => "char",
            Token::Short => "short",
            Token::Int => "int",
            Token::Long => "long",
            Token::Float => "float",
            Token::Double => "double",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::At => "@",
            Token::Arrow => "->",
            Token::Assign => "=",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Question => "?",
            Token::Colon => ":",
            Token::True => "true",
            Token::False => "false",
            Token::FloatLiteral => "float literal",
            Token::IntLiteral => "int literal",
            Token::CharLiteral => "char literal",
            Token::StringLiteral => "string literal",
            Token::Identifier => "identifier",
        };
        f.write_str(text)
    }
}
