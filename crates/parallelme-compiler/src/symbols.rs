//! Scoped symbol table.
//!
//! Symbols live in an arena (`Vec<SymbolData>`) and reference each other
//! through [`SymbolId`] handles — parents point down via child lists and
//! children point up via a parent handle, with no reference cycles. The
//! scope tree is immutable once a file's first pass completes.
//!
//! Lookup semantics: within a scope, the lexically nearest binding of a name
//! is the last one declared; `lookup_upward` walks enclosing scopes until a
//! match is found.

use crate::error::{CompilationError, CompilationResult};
use parallelme_syntax::ast::{LiteralKind, Modifier};
use parallelme_syntax::TokenAddress;

/// Handle into the symbol arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Payload of a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// Top-level scope of a file
    Root,
    /// A class declaration; `body` covers the braces
    Class { body: TokenAddress },
    /// A method declaration
    Method { signature: String },
    /// A variable declaration (local, field or parameter). `user_library`
    /// marks variables whose declared type the catalog recognizes.
    Variable {
        type_name: String,
        type_parameter: Option<String>,
        modifier: Modifier,
        user_library: bool,
        statement_address: TokenAddress,
    },
    /// A literal creator argument
    Literal { kind: LiteralKind, value: String },
    /// An opaque expression creator argument
    Expression { text: String },
    /// An object creation attributed to a variable
    Creator {
        attributed_object: String,
        arguments: Vec<SymbolId>,
        statement_address: TokenAddress,
    },
}

impl SymbolKind {
    fn discriminant(&self) -> u8 {
        match self {
            SymbolKind::Root => 0,
            SymbolKind::Class { .. } => 1,
            SymbolKind::Method { .. } => 2,
            SymbolKind::Variable { .. } => 3,
            SymbolKind::Literal { .. } => 4,
            SymbolKind::Expression { .. } => 5,
            SymbolKind::Creator { .. } => 6,
        }
    }
}

/// Filter for lookups and collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolFilter {
    Any,
    Class,
    Method,
    Variable,
    /// Variables whose type is a user-library class
    UserLibraryVariable,
    Creator,
}

impl SymbolFilter {
    fn matches(self, kind: &SymbolKind) -> bool {
        match self {
            SymbolFilter::Any => true,
            SymbolFilter::Class => matches!(kind, SymbolKind::Class { .. }),
            SymbolFilter::Method => matches!(kind, SymbolKind::Method { .. }),
            SymbolFilter::Variable => matches!(kind, SymbolKind::Variable { .. }),
            SymbolFilter::UserLibraryVariable => {
                matches!(kind, SymbolKind::Variable { user_library: true, .. })
            }
            SymbolFilter::Creator => matches!(kind, SymbolKind::Creator { .. }),
        }
    }
}

/// One symbol in the arena.
#[derive(Debug, Clone)]
pub struct SymbolData {
    pub name: String,
    pub kind: SymbolKind,
    /// Distinguishes homonyms declared in different scopes
    pub identifier: u32,
    /// Tokens of the declaration itself
    pub address: Option<TokenAddress>,
    parent: Option<SymbolId>,
    children: Vec<SymbolId>,
}

/// Arena-backed scoped symbol table.
#[derive(Debug)]
pub struct SymbolTable {
    arena: Vec<SymbolData>,
}

impl SymbolTable {
    /// Create a table containing only the root scope.
    pub fn new() -> Self {
        Self {
            arena: vec![SymbolData {
                name: String::new(),
                kind: SymbolKind::Root,
                identifier: 0,
                address: None,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The root scope.
    pub fn root(&self) -> SymbolId {
        SymbolId(0)
    }

    /// Symbol payload.
    pub fn data(&self, id: SymbolId) -> &SymbolData {
        &self.arena[id.index()]
    }

    /// Enclosing scope, None for the root.
    pub fn parent(&self, id: SymbolId) -> Option<SymbolId> {
        self.arena[id.index()].parent
    }

    /// Declare a symbol under `parent`.
    ///
    /// Fails with [`CompilationError::DuplicateInScope`] only when a symbol
    /// with the same name, the same kind and the same identifier already
    /// exists in `parent`. Homonyms with distinct identifiers coexist.
    pub fn declare(
        &mut self,
        parent: SymbolId,
        name: impl Into<String>,
        kind: SymbolKind,
        identifier: u32,
        address: Option<TokenAddress>,
    ) -> CompilationResult<SymbolId> {
        let name = name.into();
        let duplicate = self.arena[parent.index()].children.iter().any(|&child| {
            let data = &self.arena[child.index()];
            data.name == name
                && data.kind.discriminant() == kind.discriminant()
                && data.identifier == identifier
        });
        if duplicate {
            return Err(CompilationError::DuplicateInScope {
                name,
                line: address.map(|a| a.line).unwrap_or(0),
            });
        }
        let id = SymbolId(self.arena.len() as u32);
        self.arena.push(SymbolData {
            name,
            kind,
            identifier,
            address,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.arena[parent.index()].children.push(id);
        Ok(id)
    }

    /// All direct children of `scope` matching `name` and `filter`, in
    /// declaration order.
    pub fn lookup_in_scope(
        &self,
        scope: SymbolId,
        name: &str,
        filter: SymbolFilter,
    ) -> Vec<SymbolId> {
        self.arena[scope.index()]
            .children
            .iter()
            .copied()
            .filter(|&child| {
                let data = &self.arena[child.index()];
                data.name == name && filter.matches(&data.kind)
            })
            .collect()
    }

    /// Walk enclosing scopes from `scope` outward and return the lexically
    /// nearest binding of `name` matching `filter`.
    pub fn lookup_upward(
        &self,
        scope: SymbolId,
        name: &str,
        filter: SymbolFilter,
    ) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(&found) = self.lookup_in_scope(id, name, filter).last() {
                return Some(found);
            }
            current = self.arena[id.index()].parent;
        }
        None
    }

    /// Attach converted argument symbols to a creator, completing its
    /// declaration. Only the first pass calls this; the table is immutable
    /// afterwards.
    pub(crate) fn attach_creator_arguments(&mut self, creator: SymbolId, ids: Vec<SymbolId>) {
        if let SymbolKind::Creator { arguments, .. } = &mut self.arena[creator.index()].kind {
            *arguments = ids;
        }
    }

    /// Pre-order enumeration of symbols under `scope` matching `filter`.
    pub fn collect(&self, scope: SymbolId, filter: SymbolFilter, recursive: bool) -> Vec<SymbolId> {
        let mut result = Vec::new();
        self.collect_into(scope, filter, recursive, &mut result);
        result
    }

    fn collect_into(
        &self,
        scope: SymbolId,
        filter: SymbolFilter,
        recursive: bool,
        result: &mut Vec<SymbolId>,
    ) {
        for &child in &self.arena[scope.index()].children {
            if filter.matches(&self.arena[child.index()].kind) {
                result.push(child);
            }
            if recursive {
                self.collect_into(child, filter, recursive, result);
            }
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
