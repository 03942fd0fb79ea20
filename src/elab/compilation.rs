// Copyright (c) 2024-2026 The shannon developers

//! The central data structure of the elaborator.
//!
//! A [`Compilation`] owns everything produced while elaborating a set of
//! syntax trees: the symbol table, the interned types, the definition and
//! package maps, the system subroutine table, and the diagnostics. Syntax
//! trees are added one by one; the first call to [`root`](Compilation::root)
//! finalizes the set and instantiates the top-level modules.

use crate::symbols::*;
use crate::ty::*;
use shannon_common::arenas::TypedArena;
use shannon_common::errors::*;
use shannon_common::name::{get_name_table, Name};
use shannon_common::source::INVALID_SPAN;
use shannon_syntax::ast;
use shannon_syntax::SyntaxTree;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// The arenas that own everything allocated during elaboration. Created by
/// the caller so that the compilation can hand out references tied to the
/// arena's lifetime.
pub struct GlobalArenas<'t> {
    pub(crate) types: TypedArena<TypeKind<'t>>,
}

impl Default for GlobalArenas<'_> {
    fn default() -> Self {
        GlobalArenas {
            types: TypedArena::new(),
        }
    }
}

/// The built-in system subroutines the constant evaluator can dispatch.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SystemFunc {
    Clog2,
    Bits,
    Left,
    Right,
    Low,
    High,
    Size,
    Increment,
}

/// A compilation: a set of syntax trees elaborated together.
pub struct Compilation<'t> {
    pub arena: &'t GlobalArenas<'t>,
    /// The diagnostics accumulated by every stage working on this
    /// compilation.
    pub diag: Diagnostics,
    pub(crate) trees: RefCell<Vec<Rc<SyntaxTree>>>,
    pub(crate) types: RefCell<HashMap<TypeKind<'t>, Type<'t>>>,
    pub(crate) symbols: RefCell<Vec<Rc<Symbol<'t>>>>,
    pub(crate) packages: RefCell<HashMap<Name, SymbolId>>,
    /// Module/interface/program definitions keyed by name and declaring
    /// scope.
    pub(crate) definitions: RefCell<HashMap<(Name, SymbolId), Rc<DefData>>>,
    pub(crate) system_functions: HashMap<Name, SystemFunc>,
    finalized: Cell<bool>,
    root: Cell<Option<SymbolId>>,
}

impl<'t> Compilation<'t> {
    /// Create a new compilation allocating into the given arenas.
    pub fn new(arena: &'t GlobalArenas<'t>) -> Compilation<'t> {
        let nt = get_name_table();
        let mut system_functions = HashMap::new();
        system_functions.insert(nt.intern("clog2"), SystemFunc::Clog2);
        system_functions.insert(nt.intern("bits"), SystemFunc::Bits);
        system_functions.insert(nt.intern("left"), SystemFunc::Left);
        system_functions.insert(nt.intern("right"), SystemFunc::Right);
        system_functions.insert(nt.intern("low"), SystemFunc::Low);
        system_functions.insert(nt.intern("high"), SystemFunc::High);
        system_functions.insert(nt.intern("size"), SystemFunc::Size);
        system_functions.insert(nt.intern("increment"), SystemFunc::Increment);
        Compilation {
            arena,
            diag: Diagnostics::new(),
            trees: RefCell::new(Vec::new()),
            types: RefCell::new(HashMap::new()),
            symbols: RefCell::new(Vec::new()),
            packages: RefCell::new(HashMap::new()),
            definitions: RefCell::new(HashMap::new()),
            system_functions,
            finalized: Cell::new(false),
            root: Cell::new(None),
        }
    }

    /// Add a parsed syntax tree to the compilation. Fails once the
    /// compilation has been finalized by a call to `root()`.
    pub fn add_syntax_tree(&self, tree: SyntaxTree) -> Result<(), ()> {
        if self.finalized.get() {
            self.diag.emit(
                DiagBuilder2::error("cannot add syntax trees to a finalized compilation")
                    .code(DiagCode::FinalizedCompilation),
            );
            return Err(());
        }
        self.trees.borrow_mut().push(Rc::new(tree));
        Ok(())
    }

    /// Whether `root()` has been called.
    pub fn is_finalized(&self) -> bool {
        self.finalized.get()
    }

    /// Obtain the diagnostics sorted by source order.
    pub fn all_diagnostics(&self) -> Vec<DiagBuilder2> {
        self.diag.sorted()
    }

    // ------------------------------------------------------------------
    // Type interning
    // ------------------------------------------------------------------

    /// Intern a type. Structurally equal types come back as the same
    /// reference, making identity comparison canonical.
    pub fn intern_type(&self, kind: TypeKind<'t>) -> Type<'t> {
        if let Some(&ty) = self.types.borrow().get(&kind) {
            return ty;
        }
        let ty: Type<'t> = &*self.arena.types.alloc(kind.clone());
        self.types.borrow_mut().insert(kind, ty);
        ty
    }

    pub fn error_type(&self) -> Type<'t> {
        self.intern_type(TypeKind::Error)
    }

    pub fn void_type(&self) -> Type<'t> {
        self.intern_type(TypeKind::Void)
    }

    pub fn string_type(&self) -> Type<'t> {
        self.intern_type(TypeKind::String)
    }

    pub fn bit_type(&self) -> Type<'t> {
        self.intern_type(TypeKind::Scalar {
            kind: ScalarKind::Bit,
            signed: false,
        })
    }

    pub fn logic_type(&self) -> Type<'t> {
        self.intern_type(TypeKind::Scalar {
            kind: ScalarKind::Logic,
            signed: false,
        })
    }

    pub fn int_type(&self) -> Type<'t> {
        self.intern_type(TypeKind::PredefInt {
            kind: PredefInt::Int,
            signed: true,
        })
    }

    pub fn real_type(&self) -> Type<'t> {
        self.intern_type(TypeKind::Floating(FloatingKind::Real))
    }

    /// The canonical packed type of a given width: a scalar for width one,
    /// a packed array of scalars otherwise.
    pub fn make_vector(&self, width: u32, signed: bool, four_state: bool) -> Type<'t> {
        let kind = if four_state {
            ScalarKind::Logic
        } else {
            ScalarKind::Bit
        };
        if width <= 1 {
            return self.intern_type(TypeKind::Scalar { kind, signed });
        }
        let elem = self.intern_type(TypeKind::Scalar {
            kind,
            signed: false,
        });
        let base = self.intern_type(TypeKind::PackedArray {
            elem,
            range: Range {
                msb: width as i32 - 1,
                lsb: 0,
            },
        });
        if signed {
            // Signedness lives on the element for scalars; packed arrays
            // carry it through a signed element.
            let elem = self.intern_type(TypeKind::Scalar { kind, signed: true });
            self.intern_type(TypeKind::PackedArray {
                elem,
                range: Range {
                    msb: width as i32 - 1,
                    lsb: 0,
                },
            })
        } else {
            base
        }
    }

    /// The result type of a binary arithmetic operator over two operands,
    /// per the integer promotion rules: widths max, signed only if both
    /// are, four-state if either is (or the operator forces it).
    pub fn binary_arith_type(
        &self,
        lhs: Type<'t>,
        rhs: Type<'t>,
        force_four_state: bool,
    ) -> Type<'t> {
        if lhs.is_error() || rhs.is_error() {
            return self.error_type();
        }
        if lhs.is_floating() || rhs.is_floating() {
            // Pick `real` only when a 64-bit floating operand is involved.
            let is_wide = |t: Type<'t>| match t.resolve() {
                TypeKind::Floating(FloatingKind::ShortReal) => false,
                TypeKind::Floating(_) => true,
                _ => false,
            };
            let kind = if is_wide(lhs) || is_wide(rhs) {
                FloatingKind::Real
            } else {
                FloatingKind::ShortReal
            };
            return self.intern_type(TypeKind::Floating(kind));
        }
        if !lhs.is_integral() || !rhs.is_integral() {
            return self.error_type();
        }
        let width = lhs.width().max(rhs.width());
        let signed = lhs.is_signed() && rhs.is_signed();
        let four_state = lhs.is_four_state() || rhs.is_four_state() || force_four_state;
        // Prefer an operand's own type when it already has the computed
        // shape; this preserves typedef aliases in diagnostics.
        for &t in &[lhs, rhs] {
            if t.width() == width && t.is_signed() == signed && t.is_four_state() == four_state {
                return t;
            }
        }
        self.make_vector(width, signed, four_state)
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    pub(crate) fn alloc_symbol(
        &self,
        name: Name,
        span: shannon_common::source::Span,
        parent: Option<SymbolId>,
        kind: SymbolKind<'t>,
    ) -> SymbolId {
        let mut symbols = self.symbols.borrow_mut();
        let id = SymbolId(symbols.len() as u32);
        symbols.push(Rc::new(Symbol {
            id,
            name,
            span,
            parent,
            kind,
        }));
        id
    }

    /// Fetch a symbol by handle.
    pub fn symbol(&self, id: SymbolId) -> Rc<Symbol<'t>> {
        self.symbols.borrow()[id.0 as usize].clone()
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Obtain the root of the elaborated hierarchy, finalizing the
    /// compilation on the first call. Finalization scans all definitions,
    /// determines the top modules (those never instantiated), and
    /// instantiates them with default parameters, sorted by name.
    pub fn root(&self) -> SymbolId {
        if let Some(root) = self.root.get() {
            return root;
        }
        self.finalized.set(true);
        let nt = get_name_table();
        let root = self.alloc_symbol(
            nt.intern("$root"),
            INVALID_SPAN,
            None,
            SymbolKind::Root {
                units: RefCell::new(Vec::new()),
                tops: RefCell::new(Vec::new()),
            },
        );
        self.root.set(Some(root));

        let trees: Vec<Rc<SyntaxTree>> = self.trees.borrow().clone();
        let mut defs: Vec<Rc<DefData>> = Vec::new();
        let mut instantiated: HashSet<Name> = HashSet::new();

        for tree in &trees {
            let unit = self.alloc_symbol(
                nt.intern("$unit"),
                tree.root.span,
                Some(root),
                SymbolKind::CompilationUnit(Scope::new(tree.root.items.clone())),
            );
            if let SymbolKind::Root { units, .. } = &self.symbol(root).kind {
                units.borrow_mut().push(unit);
            }

            // Harvest definitions, packages, and instantiation targets.
            for item in &tree.root.items {
                self.harvest_item(unit, item, &mut defs, &mut instantiated);
            }
        }

        // Any module definition whose name is never used as an
        // instantiation target becomes a top-level instance. Sort by name
        // so the result is deterministic.
        let mut tops: Vec<Rc<DefData>> = defs
            .iter()
            .filter(|d| d.kind == ast::ModuleKind::Module && !instantiated.contains(&d.name))
            .cloned()
            .collect();
        tops.sort_by_key(|d| d.name.as_str().to_string());
        for def in tops {
            trace!("instantiating top module {}", def.name);
            let inst = self.alloc_symbol(
                def.name,
                def.span,
                Some(root),
                SymbolKind::Instance {
                    def: def.clone(),
                    body: Scope::new(instance_body_items(&def)),
                },
            );
            if let SymbolKind::Root { tops, .. } = &self.symbol(root).kind {
                tops.borrow_mut().push(inst);
            }
        }

        root
    }

    fn harvest_item(
        &self,
        scope: SymbolId,
        item: &ast::Item,
        defs: &mut Vec<Rc<DefData>>,
        instantiated: &mut HashSet<Name>,
    ) {
        match &item.data {
            ast::ItemData::ModuleDecl(decl) => {
                let def = Rc::new(DefData {
                    kind: decl.kind,
                    name: decl.name.name,
                    span: item.span,
                    ast: Rc::new(decl.clone()),
                });
                let key = (def.name, scope);
                if self.definitions.borrow().contains_key(&key) {
                    self.diag.emit(
                        DiagBuilder2::error(format!(
                            "duplicate definition of `{}`",
                            def.name
                        ))
                        .code(DiagCode::DuplicateDefinition)
                        .span(decl.name.span),
                    );
                } else {
                    self.definitions.borrow_mut().insert(key, def.clone());
                }
                defs.push(def);
                for sub in &decl.items {
                    self.harvest_item(scope, sub, defs, instantiated);
                }
            }
            ast::ItemData::PackageDecl(decl) => {
                let pkg = self.alloc_symbol(
                    decl.name.name,
                    item.span,
                    Some(scope),
                    SymbolKind::Package(Scope::new(decl.items.clone())),
                );
                self.packages.borrow_mut().insert(decl.name.name, pkg);
                for sub in &decl.items {
                    self.harvest_item(pkg, sub, defs, instantiated);
                }
            }
            ast::ItemData::Inst(inst) => {
                instantiated.insert(inst.target.name);
            }
            ast::ItemData::GenerateRegion(items) => {
                for sub in items {
                    self.harvest_item(scope, sub, defs, instantiated);
                }
            }
            ast::ItemData::GenerateIf(gi) => {
                for sub in &gi.main.items {
                    self.harvest_item(scope, sub, defs, instantiated);
                }
                if let Some(alt) = &gi.alt {
                    for sub in &alt.items {
                        self.harvest_item(scope, sub, defs, instantiated);
                    }
                }
            }
            ast::ItemData::GenerateFor(gf) => {
                for sub in &gf.block.items {
                    self.harvest_item(scope, sub, defs, instantiated);
                }
            }
            ast::ItemData::GenerateCase(gc) => {
                for arm in &gc.arms {
                    for sub in &arm.block.items {
                        self.harvest_item(scope, sub, defs, instantiated);
                    }
                }
            }
            _ => (),
        }
    }

    /// Find a definition visible from a scope, walking outward.
    pub(crate) fn lookup_definition(
        &self,
        name: Name,
        mut scope: Option<SymbolId>,
    ) -> Option<Rc<DefData>> {
        let defs = self.definitions.borrow();
        while let Some(id) = scope {
            if let Some(def) = defs.get(&(name, id)) {
                return Some(def.clone());
            }
            scope = self.symbol(id).parent;
        }
        // Definitions at any compilation-unit level are visible globally.
        defs.iter()
            .find(|((n, _), _)| *n == name)
            .map(|(_, def)| def.clone())
    }
}

impl DiagEmitter for Compilation<'_> {
    fn emit(&self, diag: DiagBuilder2) {
        self.diag.emit(diag)
    }
}

/// The items that make up an instance body: the definition's parameter
/// ports, its ports, and its body items, in declaration order.
pub(crate) fn instance_body_items(def: &DefData) -> Vec<ast::Item> {
    let mut items = Vec::new();
    for param in &def.ast.param_ports {
        items.push(ast::Item::new(
            def.span,
            ast::ItemData::ParamDecl(param.clone()),
        ));
    }
    for port in &def.ast.ports {
        items.push(ast::Item::new(
            port.span,
            ast::ItemData::VarDecl(ast::VarDecl {
                konst: false,
                ty: port.ty.clone(),
                decls: vec![ast::DeclAssignment {
                    name: port.name,
                    dims: port.dims.clone(),
                    init: port.default.clone(),
                }],
            }),
        ));
    }
    items.extend(def.ast.items.iter().cloned());
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::ConstantValue;
    use crate::ty::matching;
    use shannon_common::svint::SVInt;
    use shannon_syntax::SyntaxTree;

    fn compile<'t>(arena: &'t GlobalArenas<'t>, sources: &[&str]) -> Compilation<'t> {
        let cx = Compilation::new(arena);
        for src in sources {
            let tree = SyntaxTree::from_text(src, &cx.diag);
            cx.add_syntax_tree(tree).unwrap();
        }
        cx
    }

    fn member<'t>(cx: &Compilation<'t>, scope: SymbolId, name: &str) -> SymbolId {
        let name = get_name_table().intern(name);
        cx.scope_member(scope, name)
            .unwrap_or_else(|| panic!("member `{}` not found", name))
    }

    #[test]
    fn parameter_constant_folding() {
        let arena = GlobalArenas::default();
        let cx = compile(&arena, &["module foo; parameter p = 1 + 2; endmodule"]);
        let top = cx.find_top("foo").expect("foo should be a top module");
        let p = member(&cx, top, "p");
        match cx.constant_value_of(p).expect("p should be constant") {
            ConstantValue::Int(v) => {
                assert_eq!(v.width(), 32);
                assert!(v.is_signed());
                assert_eq!(v.to_i32(), Some(3));
            }
            other => panic!("expected integer, got {:?}", other),
        }
        assert!(cx.all_diagnostics().is_empty());
    }

    #[test]
    fn type_interning_is_injective() {
        let arena = GlobalArenas::default();
        let cx = Compilation::new(&arena);
        let a = cx.make_vector(8, false, true);
        let b = cx.make_vector(8, false, true);
        assert!(std::ptr::eq(a, b));
        let c = cx.make_vector(8, true, true);
        assert!(!std::ptr::eq(a, c));
        assert!(std::ptr::eq(cx.int_type(), cx.int_type()));
        assert!(matching(a, b));
    }

    #[test]
    fn top_modules_are_sorted_and_exclude_instantiated() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &[
                "module zebra; endmodule",
                "module alpha; endmodule",
                "module mid; alpha u_a(); endmodule",
            ],
        );
        let tops: Vec<String> = cx
            .top_instances()
            .into_iter()
            .map(|id| cx.symbol(id).name.as_str().to_string())
            .collect();
        assert_eq!(tops, vec!["mid".to_string(), "zebra".to_string()]);
    }

    #[test]
    fn refinalizing_is_a_no_op_and_adding_after_fails() {
        let arena = GlobalArenas::default();
        let cx = compile(&arena, &["module a; endmodule"]);
        let first = cx.root();
        let second = cx.root();
        assert_eq!(first, second);
        let tree = SyntaxTree::from_text("module b; endmodule", &cx.diag);
        assert!(cx.add_syntax_tree(tree).is_err());
        assert!(cx
            .diag
            .sorted_codes()
            .contains(&DiagCode::FinalizedCompilation));
    }

    #[test]
    fn parameters_reference_each_other() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &["module m; parameter a = 4; parameter b = a * 2; localparam c = b + a; endmodule"],
        );
        let top = cx.find_top("m").unwrap();
        let c = member(&cx, top, "c");
        assert_eq!(
            cx.constant_value_of(c).unwrap(),
            ConstantValue::Int(SVInt::new(32, true, 12.into()))
        );
        assert!(cx.all_diagnostics().is_empty());
    }

    #[test]
    fn typed_parameters_convert_their_values() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &["module m; parameter logic [3:0] p = 8'hff; endmodule"],
        );
        let top = cx.find_top("m").unwrap();
        let p = member(&cx, top, "p");
        match cx.constant_value_of(p).unwrap() {
            ConstantValue::Int(v) => {
                assert_eq!(v.width(), 4);
                assert_eq!(v.to_u32(), Some(0xf));
            }
            other => panic!("expected integer, got {:?}", other),
        }
    }

    #[test]
    fn packages_and_wildcard_imports() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &[
                "package defs_pkg; parameter P = 4; endpackage",
                "module uses_pkg; import defs_pkg::*; parameter q = P + 1; endmodule",
            ],
        );
        let top = cx.find_top("uses_pkg").unwrap();
        let q = member(&cx, top, "q");
        assert_eq!(
            cx.constant_value_of(q).unwrap(),
            ConstantValue::Int(SVInt::new(32, true, 5.into()))
        );
        assert!(cx.all_diagnostics().is_empty());
    }

    #[test]
    fn explicit_imports_and_scoped_names() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &[
                "package cfg_pkg; parameter WIDTH = 16; endpackage",
                "module m1; import cfg_pkg::WIDTH; parameter a = WIDTH; endmodule",
                "module m2; parameter b = cfg_pkg::WIDTH / 2; endmodule",
            ],
        );
        let a = member(&cx, cx.find_top("m1").unwrap(), "a");
        assert_eq!(
            cx.constant_value_of(a).unwrap(),
            ConstantValue::Int(SVInt::new(32, true, 16.into()))
        );
        let b = member(&cx, cx.find_top("m2").unwrap(), "b");
        assert_eq!(
            cx.constant_value_of(b).unwrap(),
            ConstantValue::Int(SVInt::new(32, true, 8.into()))
        );
        assert!(cx.all_diagnostics().is_empty());
    }

    #[test]
    fn system_functions() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &["module m;\n\
               typedef logic [7:0] byte_t;\n\
               parameter bits = $bits(byte_t);\n\
               parameter depth = $clog2(16);\n\
               parameter one = $clog2(1);\n\
               parameter odd = $clog2(100);\n\
               parameter l = $left(byte_t);\n\
               parameter r = $right(byte_t);\n\
               parameter sz = $size(byte_t);\n\
               parameter inc = $increment(byte_t);\n\
               endmodule"],
        );
        let top = cx.find_top("m").unwrap();
        let check = |name: &str, expected: i32| {
            let id = member(&cx, top, name);
            match cx.constant_value_of(id) {
                Ok(ConstantValue::Int(v)) => assert_eq!(v.to_i32(), Some(expected), "{}", name),
                other => panic!("{} did not evaluate: {:?}", name, other),
            }
        };
        check("bits", 8);
        check("depth", 4);
        check("one", 0);
        check("odd", 7);
        check("l", 7);
        check("r", 0);
        check("sz", 8);
        check("inc", 1);
        assert!(cx.all_diagnostics().is_empty());
    }

    #[test]
    fn enum_variant_values() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &["module m;\n\
               typedef enum logic [1:0] { IDLE = 1, RUN, DONE = 3 } state_t;\n\
               parameter r = RUN;\n\
               endmodule"],
        );
        let top = cx.find_top("m").unwrap();
        let r = member(&cx, top, "r");
        match cx.constant_value_of(r).unwrap() {
            ConstantValue::Int(v) => assert_eq!(v.to_i32(), Some(2)),
            other => panic!("expected integer, got {:?}", other),
        }
    }

    #[test]
    fn typedef_alias_preserves_name_but_matches_target() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &["module m; typedef int word_t; parameter word_t w = 3; endmodule"],
        );
        let top = cx.find_top("m").unwrap();
        let w = member(&cx, top, "w");
        let ty = cx.type_of_symbol(w);
        assert!(matching(ty, cx.int_type()));
        assert_eq!(format!("{}", ty), "word_t");
        assert_eq!(
            cx.constant_value_of(w).unwrap(),
            ConstantValue::Int(SVInt::new(32, true, 3.into()))
        );
    }

    #[test]
    fn division_by_zero_is_all_x_without_diagnostics() {
        let arena = GlobalArenas::default();
        let cx = compile(&arena, &["module m; parameter d = 1 / 0; endmodule"]);
        let top = cx.find_top("m").unwrap();
        let d = member(&cx, top, "d");
        match cx.constant_value_of(d).unwrap() {
            ConstantValue::Int(v) => assert!(v.has_unknown()),
            other => panic!("expected integer, got {:?}", other),
        }
        assert!(cx.all_diagnostics().is_empty());
    }

    #[test]
    fn hierarchical_parameter_access() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &[
                "module sub; parameter pp = 7; endmodule",
                "module outer_t; sub u_sub(); parameter z = u_sub.pp; endmodule",
            ],
        );
        let top = cx.find_top("outer_t").unwrap();
        let z = member(&cx, top, "z");
        assert_eq!(
            cx.constant_value_of(z).unwrap(),
            ConstantValue::Int(SVInt::new(32, true, 7.into()))
        );
        assert!(cx.all_diagnostics().is_empty());
    }

    #[test]
    fn unknown_names_are_diagnosed_once() {
        let arena = GlobalArenas::default();
        let cx = compile(&arena, &["module m; parameter p = nope + 1; endmodule"]);
        let top = cx.find_top("m").unwrap();
        let p = member(&cx, top, "p");
        assert!(cx.constant_value_of(p).is_err());
        let codes = cx.diag.sorted_codes();
        assert!(codes.contains(&DiagCode::UnknownName));
        // The bad binding poisons quietly; no cascade of
        // expression-not-constant errors.
        assert!(!codes.contains(&DiagCode::ExpressionNotConstant));
    }

    #[test]
    fn circular_parameters_are_diagnosed() {
        let arena = GlobalArenas::default();
        let cx = compile(&arena, &["module m; parameter a = a + 1; endmodule"]);
        let top = cx.find_top("m").unwrap();
        // A parameter depending on its own value must not hang.
        let a = member(&cx, top, "a");
        assert!(cx.constant_value_of(a).is_err());
        assert!(cx
            .diag
            .sorted_codes()
            .contains(&DiagCode::ExpressionNotConstant));
    }

    #[test]
    fn struct_fields_and_member_access() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &["module m;\n\
               typedef struct packed { logic [7:0] hi; logic [7:0] lo; } pair_t;\n\
               parameter pair_t p = 16'h1234;\n\
               parameter h = p.hi;\n\
               parameter lo = p.lo;\n\
               endmodule"],
        );
        let top = cx.find_top("m").unwrap();
        let h = member(&cx, top, "h");
        match cx.constant_value_of(h).unwrap() {
            ConstantValue::Int(v) => assert_eq!(v.to_u32(), Some(0x12)),
            other => panic!("expected integer, got {:?}", other),
        }
        let lo = member(&cx, top, "lo");
        match cx.constant_value_of(lo).unwrap() {
            ConstantValue::Int(v) => assert_eq!(v.to_u32(), Some(0x34)),
            other => panic!("expected integer, got {:?}", other),
        }
    }

    #[test]
    fn part_selects_and_concatenation() {
        let arena = GlobalArenas::default();
        let cx = compile(
            &arena,
            &["module m;\n\
               parameter logic [7:0] v = 8'hA5;\n\
               parameter hi = v[7:4];\n\
               parameter cat = {v[3:0], 4'h0};\n\
               endmodule"],
        );
        let top = cx.find_top("m").unwrap();
        let hi = member(&cx, top, "hi");
        match cx.constant_value_of(hi).unwrap() {
            ConstantValue::Int(v) => assert_eq!(v.to_u32(), Some(0xA)),
            other => panic!("expected integer, got {:?}", other),
        }
        let cat = member(&cx, top, "cat");
        match cx.constant_value_of(cat).unwrap() {
            ConstantValue::Int(v) => {
                assert_eq!(v.width(), 8);
                assert_eq!(v.to_u32(), Some(0x50));
            }
            other => panic!("expected integer, got {:?}", other),
        }
        assert!(cx.all_diagnostics().is_empty());
    }

    #[test]
    fn lazy_members_materialize_on_lookup() {
        let arena = GlobalArenas::default();
        let cx = compile(&arena, &["module m; parameter a = 1; parameter b = 2; endmodule"]);
        let top = cx.find_top("m").unwrap();
        // Before any lookup the scope is still syntax.
        let members = cx.members_of(top);
        assert_eq!(members.len(), 2);
    }
}
