// Copyright (c) 2024-2026 The shannon developers

//! The symbol and scope model.
//!
//! Symbols are handle-indexed: a [`SymbolId`] is a small integer into the
//! compilation's symbol table, which makes the cyclic scope graph (scopes
//! point at their members, members back at their declaring scope) natural
//! to represent. Scope members are materialized lazily: a scope holds its
//! syntax items until the first lookup or iteration forces them into
//! symbols.

use crate::compilation::Compilation;
use crate::eval::ConstantValue;
use crate::ty::Type;
use shannon_common::errors::*;
use shannon_common::name::{get_name_table, Name};
use shannon_common::source::Span;
use shannon_syntax::ast;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// A lightweight handle to a symbol in the compilation's table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SymbolId(pub u32);

bitflags! {
    /// Restrictions a name lookup may impose on its result.
    pub struct LookupFlags: u8 {
        /// Only symbols with a constant-evaluable value qualify.
        const CONSTANT = 0b001;
        /// The name is being called; system names resolve against the
        /// subroutine table.
        const CALLABLE = 0b010;
        /// The name must denote a type.
        const TYPE     = 0b100;
    }
}

/// A symbol in the elaborated hierarchy.
pub struct Symbol<'t> {
    pub id: SymbolId,
    /// The declared name; the empty name for anonymous symbols.
    pub name: Name,
    pub span: Span,
    /// The declaring scope. `None` only for the root.
    pub parent: Option<SymbolId>,
    pub kind: SymbolKind<'t>,
}

/// A parsed module/interface/program declaration awaiting instantiation.
pub struct DefData {
    pub kind: ast::ModuleKind,
    pub name: Name,
    pub span: Span,
    pub ast: Rc<ast::ModuleDecl>,
}

pub enum SymbolKind<'t> {
    /// The root of the hierarchy, owning the compilation units and the
    /// instantiated top modules.
    Root {
        units: RefCell<Vec<SymbolId>>,
        tops: RefCell<Vec<SymbolId>>,
    },
    /// One compilation unit per syntax tree.
    CompilationUnit(Scope),
    Package(Scope),
    /// A definition as a scope member; instantiation targets resolve
    /// through the compilation's definition map.
    Definition(Rc<DefData>),
    /// An instantiated module.
    Instance { def: Rc<DefData>, body: Scope },
    /// A named or anonymous generate block.
    GenerateBlock(Scope),
    Variable(ValueSym<'t>),
    Net(ValueSym<'t>),
    Parameter(ParamSym<'t>),
    Typedef(TypedefSym<'t>),
    EnumVariant(EnumVariantSym<'t>),
    Subroutine(Rc<ast::SubroutineDecl>),
    Genvar,
    /// A wildcard import `pkg::*`, indexed separately on its scope.
    WildcardImport { pkg: Name },
    /// An explicit import `pkg::name`; lookups resolve through to the
    /// package member.
    ExplicitImport { pkg: Name, name: Name },
}

/// A variable- or net-like symbol: declared type syntax, unpacked
/// dimensions, optional initializer, and the lazily resolved type.
pub struct ValueSym<'t> {
    pub ty: RefCell<Option<Type<'t>>>,
    pub ty_ast: ast::Type,
    pub dims: Vec<ast::TypeDim>,
    pub init: Option<ast::Expr>,
}

/// A parameter. The value and type are computed on first use and cached;
/// the `evaluating` flag breaks dependency cycles.
pub struct ParamSym<'t> {
    pub local: bool,
    pub ty: RefCell<Option<Type<'t>>>,
    pub ty_ast: ast::Type,
    pub init: Option<ast::Expr>,
    pub value: RefCell<Option<Result<ConstantValue, ()>>>,
    pub evaluating: Cell<bool>,
}

pub struct TypedefSym<'t> {
    pub ty: RefCell<Option<Type<'t>>>,
    pub ty_ast: ast::Type,
    pub dims: Vec<ast::TypeDim>,
}

pub struct EnumVariantSym<'t> {
    pub ty: RefCell<Option<Type<'t>>>,
    pub init: Option<ast::Expr>,
    pub index: u32,
    /// The preceding variant; an unvalued variant is its predecessor plus
    /// one.
    pub prev: Option<SymbolId>,
    pub value: RefCell<Option<Result<ConstantValue, ()>>>,
}

/// A collection of members with by-name access and deferred
/// materialization.
pub struct Scope {
    pub members: RefCell<Vec<SymbolId>>,
    pub names: RefCell<HashMap<Name, SymbolId>>,
    /// Wildcard imports, indexed separately so lookups need not scan all
    /// members.
    pub imports: RefCell<Vec<SymbolId>>,
    /// Syntax items whose symbolization is deferred until first access.
    pub pending: RefCell<Vec<ast::Item>>,
    pub materialized: Cell<bool>,
}

impl Scope {
    pub fn new(pending: Vec<ast::Item>) -> Scope {
        Scope {
            members: RefCell::new(Vec::new()),
            names: RefCell::new(HashMap::new()),
            imports: RefCell::new(Vec::new()),
            pending: RefCell::new(pending),
            materialized: Cell::new(false),
        }
    }
}

/// The scope contained in a symbol, if it has one.
pub fn scope_of<'a, 't>(sym: &'a Symbol<'t>) -> Option<&'a Scope> {
    match &sym.kind {
        SymbolKind::CompilationUnit(scope)
        | SymbolKind::Package(scope)
        | SymbolKind::GenerateBlock(scope) => Some(scope),
        SymbolKind::Instance { body, .. } => Some(body),
        _ => None,
    }
}

impl<'t> Compilation<'t> {
    /// Force a scope's pending syntax into symbols. The first pass declares
    /// all names; initializers and types resolve lazily afterwards, which
    /// is what lets members reference each other out of order.
    pub fn materialize(&self, id: SymbolId) {
        let sym = self.symbol(id);
        let scope = match scope_of(&sym) {
            Some(scope) => scope,
            None => return,
        };
        if scope.materialized.get() {
            return;
        }
        scope.materialized.set(true);
        let pending: Vec<ast::Item> = scope.pending.borrow_mut().drain(..).collect();
        trace!("materializing scope {} with {} items", sym.name, pending.len());
        for item in &pending {
            self.symbolize_item(id, scope, item);
        }
    }

    pub(crate) fn add_member(&self, scope: &Scope, id: SymbolId) {
        let sym = self.symbol(id);
        scope.members.borrow_mut().push(id);
        let name = sym.name;
        if !name.as_str().is_empty() {
            let mut names = scope.names.borrow_mut();
            if let Some(&existing) = names.get(&name) {
                let existing = self.symbol(existing);
                self.diag.emit(
                    DiagBuilder2::error(format!("`{}` is already declared in this scope", name))
                        .code(DiagCode::DuplicateDefinition)
                        .span(sym.span)
                        .add_note(format!(
                            "previous declaration of `{}` was here: {:?}",
                            name, existing.span
                        )),
                );
            } else {
                names.insert(name, id);
            }
        }
    }

    pub(crate) fn symbolize_item(&self, parent: SymbolId, scope: &Scope, item: &ast::Item) {
        match &item.data {
            ast::ItemData::ParamDecl(decl) => {
                for da in &decl.decls {
                    let id = self.alloc_symbol(
                        da.name.name,
                        da.name.span,
                        Some(parent),
                        SymbolKind::Parameter(ParamSym {
                            local: decl.local,
                            ty: RefCell::new(None),
                            ty_ast: decl.ty.clone(),
                            init: da.init.clone(),
                            value: RefCell::new(None),
                            evaluating: Cell::new(false),
                        }),
                    );
                    self.add_member(scope, id);
                }
            }
            ast::ItemData::VarDecl(decl) => {
                for da in &decl.decls {
                    let id = self.alloc_symbol(
                        da.name.name,
                        da.name.span,
                        Some(parent),
                        SymbolKind::Variable(ValueSym {
                            ty: RefCell::new(None),
                            ty_ast: decl.ty.clone(),
                            dims: da.dims.clone(),
                            init: da.init.clone(),
                        }),
                    );
                    self.add_member(scope, id);
                }
            }
            ast::ItemData::NetDecl(decl) => {
                for da in &decl.decls {
                    let id = self.alloc_symbol(
                        da.name.name,
                        da.name.span,
                        Some(parent),
                        SymbolKind::Net(ValueSym {
                            ty: RefCell::new(None),
                            ty_ast: decl.ty.clone(),
                            dims: da.dims.clone(),
                            init: da.init.clone(),
                        }),
                    );
                    self.add_member(scope, id);
                }
            }
            ast::ItemData::TypedefDecl(td) => {
                let id = self.alloc_symbol(
                    td.name.name,
                    td.name.span,
                    Some(parent),
                    SymbolKind::Typedef(TypedefSym {
                        ty: RefCell::new(None),
                        ty_ast: td.ty.clone(),
                        dims: td.dims.clone(),
                    }),
                );
                self.add_member(scope, id);
                // Enum variants spill into the enclosing scope.
                if let ast::TypeKind::EnumType { variants, .. } = &td.ty.data.kind {
                    self.symbolize_enum_variants(parent, scope, variants);
                }
            }
            ast::ItemData::ImportDecl(decl) => {
                for imp in &decl.items {
                    match imp.name {
                        None => {
                            let id = self.alloc_symbol(
                                get_name_table().intern(""),
                                imp.pkg.span,
                                Some(parent),
                                SymbolKind::WildcardImport { pkg: imp.pkg.name },
                            );
                            scope.members.borrow_mut().push(id);
                            scope.imports.borrow_mut().push(id);
                        }
                        Some(name) => {
                            let id = self.alloc_symbol(
                                name.name,
                                name.span,
                                Some(parent),
                                SymbolKind::ExplicitImport {
                                    pkg: imp.pkg.name,
                                    name: name.name,
                                },
                            );
                            self.add_member(scope, id);
                        }
                    }
                }
            }
            ast::ItemData::ModuleDecl(decl) => {
                // Nested definitions were harvested during finalization;
                // here they just become visible members of the scope.
                let def = self
                    .lookup_definition(decl.name.name, Some(parent))
                    .unwrap_or_else(|| {
                        Rc::new(DefData {
                            kind: decl.kind,
                            name: decl.name.name,
                            span: item.span,
                            ast: Rc::new(decl.clone()),
                        })
                    });
                let id = self.alloc_symbol(
                    decl.name.name,
                    decl.name.span,
                    Some(parent),
                    SymbolKind::Definition(def),
                );
                self.add_member(scope, id);
            }
            ast::ItemData::PackageDecl(decl) => {
                // Packages were registered during finalization; surface the
                // existing symbol as a member if there is one.
                if let Some(&pkg) = self.packages.borrow().get(&decl.name.name) {
                    scope.members.borrow_mut().push(pkg);
                }
            }
            ast::ItemData::SubroutineDecl(decl) => {
                let id = self.alloc_symbol(
                    decl.name.name,
                    decl.name.span,
                    Some(parent),
                    SymbolKind::Subroutine(Rc::new(decl.clone())),
                );
                self.add_member(scope, id);
            }
            ast::ItemData::GenvarDecl(decls) => {
                for da in decls {
                    let id = self.alloc_symbol(
                        da.name.name,
                        da.name.span,
                        Some(parent),
                        SymbolKind::Genvar,
                    );
                    self.add_member(scope, id);
                }
            }
            ast::ItemData::Inst(inst) => {
                let def = self.lookup_definition(inst.target.name, Some(parent));
                for inst_name in &inst.insts {
                    match &def {
                        Some(def) => {
                            let id = self.alloc_symbol(
                                inst_name.name.name,
                                inst_name.name.span,
                                Some(parent),
                                SymbolKind::Instance {
                                    def: def.clone(),
                                    body: Scope::new(crate::compilation::instance_body_items(
                                        def,
                                    )),
                                },
                            );
                            self.add_member(scope, id);
                        }
                        None => {
                            self.diag.emit(
                                DiagBuilder2::error(format!(
                                    "unknown module `{}`",
                                    inst.target.name
                                ))
                                .code(DiagCode::UnknownName)
                                .span(inst.target.span),
                            );
                        }
                    }
                }
            }
            // Generate regions are transparent: their items land in the
            // current scope.
            ast::ItemData::GenerateRegion(items) => {
                for sub in items {
                    self.symbolize_item(parent, scope, sub);
                }
            }
            // Conditional and loop generates become block scopes. Their
            // arms are not constant-folded away here; both sides stay
            // visible for lookup purposes.
            ast::ItemData::GenerateIf(gi) => {
                self.symbolize_generate_block(parent, scope, &gi.main);
                if let Some(alt) = &gi.alt {
                    self.symbolize_generate_block(parent, scope, alt);
                }
            }
            ast::ItemData::GenerateFor(gf) => {
                self.symbolize_generate_block(parent, scope, &gf.block);
            }
            ast::ItemData::GenerateCase(gc) => {
                for arm in &gc.arms {
                    self.symbolize_generate_block(parent, scope, &arm.block);
                }
            }
            // Procedures, continuous assignments, and class shells
            // contribute no named members to elaborate.
            ast::ItemData::ContAssign(_)
            | ast::ItemData::Procedure(_)
            | ast::ItemData::ClassDecl(_) => (),
        }
    }

    fn symbolize_enum_variants(
        &self,
        parent: SymbolId,
        scope: &Scope,
        variants: &[ast::EnumVariant],
    ) {
        let mut prev = None;
        for (index, variant) in variants.iter().enumerate() {
            let id = self.alloc_symbol(
                variant.name.name,
                variant.name.span,
                Some(parent),
                SymbolKind::EnumVariant(EnumVariantSym {
                    ty: RefCell::new(None),
                    init: variant.value.clone(),
                    index: index as u32,
                    prev,
                    value: RefCell::new(None),
                }),
            );
            self.add_member(scope, id);
            prev = Some(id);
        }
    }

    fn symbolize_generate_block(
        &self,
        parent: SymbolId,
        scope: &Scope,
        block: &ast::GenerateBlock,
    ) {
        let name = block
            .label
            .map(|l| l.name)
            .unwrap_or_else(|| get_name_table().intern(""));
        let id = self.alloc_symbol(
            name,
            block.span,
            Some(parent),
            SymbolKind::GenerateBlock(Scope::new(block.items.clone())),
        );
        if block.label.is_some() {
            self.add_member(scope, id);
        } else {
            scope.members.borrow_mut().push(id);
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Look up a name starting at a scope and walking toward the root:
    /// local members declared at or before `location` first, then wildcard
    /// imports, then the parent scope. Explicit imports resolve through to
    /// the package member.
    pub fn lookup_name(
        &self,
        scope: SymbolId,
        name: Name,
        location: Span,
        flags: LookupFlags,
    ) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            self.materialize(id);
            let sym = self.symbol(id);
            if let Some(sc) = scope_of(&sym) {
                let local = sc.names.borrow().get(&name).copied();
                if let Some(member) = local {
                    let msym = self.symbol(member);
                    if declared_before(msym.span, location) {
                        return self.resolve_import(member, flags);
                    }
                }
                let imports: Vec<SymbolId> = sc.imports.borrow().clone();
                for imp in imports {
                    let isym = self.symbol(imp);
                    if !declared_before(isym.span, location) {
                        continue;
                    }
                    if let SymbolKind::WildcardImport { pkg } = &isym.kind {
                        if let Some(found) = self.package_member(*pkg, name) {
                            return self.resolve_import(found, flags);
                        }
                    }
                }
            }
            current = sym.parent;
        }
        None
    }

    fn resolve_import(&self, id: SymbolId, flags: LookupFlags) -> Option<SymbolId> {
        let sym = self.symbol(id);
        if let SymbolKind::ExplicitImport { pkg, name } = &sym.kind {
            return self.package_member(*pkg, *name);
        }
        let _ = flags;
        Some(id)
    }

    /// Look up a member of a package by name.
    pub fn package_member(&self, pkg: Name, name: Name) -> Option<SymbolId> {
        let pkg = *self.packages.borrow().get(&pkg)?;
        self.materialize(pkg);
        let sym = self.symbol(pkg);
        let scope = scope_of(&sym)?;
        let found = scope.names.borrow().get(&name).copied();
        found
    }

    /// Look up a direct member of a scope, materializing it first. Used
    /// for hierarchical name resolution, which does not walk outward.
    pub fn scope_member(&self, scope: SymbolId, name: Name) -> Option<SymbolId> {
        self.materialize(scope);
        let sym = self.symbol(scope);
        let sc = scope_of(&sym)?;
        let found = sc.names.borrow().get(&name).copied();
        found
    }

    /// Iterate all members of a scope, materializing it first. Mostly used
    /// by tests and diagnostics passes that want to realize lazy members.
    pub fn members_of(&self, scope: SymbolId) -> Vec<SymbolId> {
        self.materialize(scope);
        let sym = self.symbol(scope);
        match scope_of(&sym) {
            Some(sc) => sc.members.borrow().clone(),
            None => match &sym.kind {
                SymbolKind::Root { units, tops } => {
                    let mut v = units.borrow().clone();
                    v.extend(tops.borrow().iter().copied());
                    v
                }
                _ => Vec::new(),
            },
        }
    }

    /// The instantiated top modules, in their deterministic name order.
    pub fn top_instances(&self) -> Vec<SymbolId> {
        let root = self.root();
        match &self.symbol(root).kind {
            SymbolKind::Root { tops, .. } => tops.borrow().clone(),
            _ => Vec::new(),
        }
    }

    /// Find a top-level instance by name.
    pub fn find_top(&self, name: &str) -> Option<SymbolId> {
        let nt = shannon_common::name::get_name_table();
        let name = nt.intern(name);
        self.top_instances()
            .into_iter()
            .find(|&id| self.symbol(id).name == name)
    }
}

/// Whether a member declared at `member` is visible from `location`. Spans
/// in different buffers (or synthesized ones) do not restrict visibility.
fn declared_before(member: Span, location: Span) -> bool {
    if !member.source.is_valid() || !location.source.is_valid() {
        return true;
    }
    if member.source != location.source {
        return true;
    }
    member.begin <= location.begin
}
