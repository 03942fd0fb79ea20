// Copyright (c) 2024-2026 The shannon developers

//! The abstract syntax tree for SystemVerilog source files.
//!
//! Nodes consist of a common [`Node`] header carrying the source span, plus
//! per-family data enums. Children are owned directly; the token stream a
//! tree was parsed from lives on the `SyntaxTree` that owns the root.

use crate::token::{Kw, Op, TimeUnit};
use shannon_common::name::Name;
use shannon_common::source::{Span, Spanned};
use shannon_common::svint::{Logic, SVInt};
use shannon_common::util::{HasDesc, HasSpan};

pub use self::ExprData::*;
pub use self::StmtData::*;

/// Common denominator across all AST nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Node<T> {
    /// Full span the node covers in the input.
    pub span: Span,
    /// Per-node data.
    pub data: T,
}

impl<T> Node<T> {
    /// Create a new AST node.
    pub fn new(span: Span, data: T) -> Self {
        Node { span, data }
    }
}

impl<T> HasSpan for Node<T> {
    fn span(&self) -> Span {
        self.span
    }
}

impl<T> std::ops::Deref for Node<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::DerefMut for Node<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

/// An identifier together with its span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identifier {
    pub span: Span,
    pub name: Name,
}

/// The root of a parsed file: a compilation unit.
pub type Root = Node<RootData>;

#[derive(Clone, Debug, PartialEq)]
pub struct RootData {
    pub timeunits: Option<Timeunit>,
    pub items: Vec<Item>,
}

/// A `timeunit`/`timeprecision` declaration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeunit {
    pub unit: Option<Spanned<(f64, TimeUnit)>>,
    pub prec: Option<Spanned<(f64, TimeUnit)>>,
}

/// An item as it appears at file level or inside a module, package, or
/// generate block.
pub type Item = Node<ItemData>;

#[derive(Clone, Debug, PartialEq)]
pub enum ItemData {
    ModuleDecl(ModuleDecl),
    PackageDecl(PackageDecl),
    ClassDecl(ClassDecl),
    ImportDecl(ImportDecl),
    ParamDecl(ParamDecl),
    TypedefDecl(Typedef),
    VarDecl(VarDecl),
    NetDecl(NetDecl),
    Inst(Instantiation),
    ContAssign(ContAssign),
    Procedure(Procedure),
    SubroutineDecl(SubroutineDecl),
    GenvarDecl(Vec<DeclAssignment>),
    GenerateRegion(Vec<Item>),
    GenerateIf(GenerateIf),
    GenerateFor(GenerateFor),
    GenerateCase(GenerateCase),
}

/// Whether a hardware description is a module, interface, or program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleKind {
    Module,
    Interface,
    Program,
}

/// A `module`, `interface`, or `program` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleDecl {
    pub kind: ModuleKind,
    pub name: Identifier,
    pub param_ports: Vec<ParamDecl>,
    pub ports: Vec<Port>,
    pub items: Vec<Item>,
}

/// A `package` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct PackageDecl {
    pub name: Identifier,
    pub items: Vec<Item>,
}

/// A `class` declaration. Only the shell is represented; class bodies are
/// carried as unelaborated items.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassDecl {
    pub name: Identifier,
    pub extends: Option<Identifier>,
    pub items: Vec<Item>,
}

/// An `import` of package members, explicit or wildcard.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportDecl {
    pub items: Vec<ImportItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportItem {
    pub pkg: Identifier,
    /// The imported name, or `None` for a wildcard import `pkg::*`.
    pub name: Option<Identifier>,
}

/// The direction of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDir {
    Input,
    Output,
    Inout,
    Ref,
}

/// An ANSI-style port declaration in a module header.
#[derive(Clone, Debug, PartialEq)]
pub struct Port {
    pub span: Span,
    pub dir: Option<PortDir>,
    pub ty: Type,
    pub name: Identifier,
    pub dims: Vec<TypeDim>,
    pub default: Option<Expr>,
}

/// A `parameter` or `localparam` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDecl {
    pub local: bool,
    pub ty: Type,
    pub decls: Vec<DeclAssignment>,
}

/// A single `name = value` inside a declaration list.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclAssignment {
    pub name: Identifier,
    pub dims: Vec<TypeDim>,
    pub init: Option<Expr>,
}

/// A `typedef` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Typedef {
    pub name: Identifier,
    pub ty: Type,
    pub dims: Vec<TypeDim>,
}

/// A variable declaration, optionally `const`.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub konst: bool,
    pub ty: Type,
    pub decls: Vec<DeclAssignment>,
}

/// A net declaration such as `wire [7:0] w;`.
#[derive(Clone, Debug, PartialEq)]
pub struct NetDecl {
    pub net_type: Kw,
    pub ty: Type,
    pub decls: Vec<DeclAssignment>,
}

/// One or more instantiations of a module, e.g. `foo #(8) a(), b();`.
#[derive(Clone, Debug, PartialEq)]
pub struct Instantiation {
    pub target: Identifier,
    pub params: Vec<CallArg>,
    pub insts: Vec<InstName>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstName {
    pub span: Span,
    pub name: Identifier,
    pub dims: Vec<TypeDim>,
    pub conns: Vec<PortConn>,
}

/// A port connection in an instantiation.
#[derive(Clone, Debug, PartialEq)]
pub enum PortConn {
    /// An automatic connection `.*`.
    Auto,
    /// A named connection `.name`, `.name()`, or `.name(expr)`.
    Named(Identifier, Option<Option<Expr>>),
    /// A positional connection.
    Positional(Expr),
}

/// A continuous assignment, e.g. `assign a = b, c = d;`.
#[derive(Clone, Debug, PartialEq)]
pub struct ContAssign {
    pub assignments: Vec<(Expr, Expr)>,
}

/// The flavor of a procedural block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcedureKind {
    Initial,
    Always,
    AlwaysComb,
    AlwaysLatch,
    AlwaysFf,
    Final,
}

/// An `initial`, `always`, or `final` block.
#[derive(Clone, Debug, PartialEq)]
pub struct Procedure {
    pub kind: ProcedureKind,
    pub stmt: Stmt,
}

/// Whether a subroutine is a function or a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubroutineKind {
    Func,
    Task,
}

/// A function or task declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct SubroutineDecl {
    pub kind: SubroutineKind,
    pub ret: Option<Type>,
    pub name: Identifier,
    pub args: Vec<SubroutineArg>,
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubroutineArg {
    pub span: Span,
    pub dir: Option<PortDir>,
    pub ty: Type,
    pub name: Identifier,
    pub default: Option<Expr>,
}

/// A conditional generate construct.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateIf {
    pub cond: Expr,
    pub main: GenerateBlock,
    pub alt: Option<GenerateBlock>,
}

/// A for-loop generate construct.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateFor {
    pub genvar: bool,
    pub var: Identifier,
    pub init: Expr,
    pub cond: Expr,
    pub step: Expr,
    pub block: GenerateBlock,
}

/// A case generate construct.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateCase {
    pub expr: Expr,
    pub arms: Vec<GenerateCaseArm>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerateCaseArm {
    /// The guard expressions; empty for the `default` arm.
    pub guards: Vec<Expr>,
    pub block: GenerateBlock,
}

/// A block of items within a generate construct, possibly labeled.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateBlock {
    pub span: Span,
    pub label: Option<Identifier>,
    pub items: Vec<Item>,
}

// ----------------------------------------------------------------------
// Types
// ----------------------------------------------------------------------

pub type Type = Node<TypeData>;

#[derive(Clone, Debug, PartialEq)]
pub struct TypeData {
    pub kind: TypeKind,
    pub sign: TypeSign,
    pub dims: Vec<TypeDim>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeSign {
    None,
    Signed,
    Unsigned,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeKind {
    /// No explicit type; determined from context.
    ImplicitType,
    VoidType,
    BitType,
    LogicType,
    RegType,
    ByteType,
    ShortIntType,
    IntType,
    LongIntType,
    IntegerType,
    TimeType,
    RealType,
    ShortRealType,
    RealtimeType,
    StringType,
    ChandleType,
    EventType,
    /// A named (typedef'd) type.
    NamedType(Identifier),
    /// A type from a package, `pkg::name`.
    ScopedType {
        pkg: Identifier,
        name: Identifier,
    },
    /// A packed or unpacked struct or union.
    StructType {
        kind: StructKind,
        packed: bool,
        members: Vec<StructMember>,
    },
    /// An enum with an optional base type.
    EnumType {
        base: Option<Box<Type>>,
        variants: Vec<EnumVariant>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructKind {
    Struct,
    Union,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructMember {
    pub span: Span,
    pub ty: Type,
    pub decls: Vec<DeclAssignment>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumVariant {
    pub name: Identifier,
    pub value: Option<Expr>,
}

/// A packed or unpacked dimension.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeDim {
    /// A range dimension `[msb:lsb]`.
    Range(Expr, Expr),
    /// A single-expression dimension `[size]`.
    Expr(Expr),
    /// An unsized dimension `[]`.
    Unsized,
    /// A queue dimension `[$]`.
    Queue,
}

// ----------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------

pub type Stmt = Node<StmtData>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    All,
    Any,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseKind {
    Normal,
    DontCareXZ,
    DontCareZ,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssertionKind {
    Assert,
    Assume,
    Cover,
    Restrict,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtData {
    NullStmt,
    SequentialBlock {
        label: Option<Identifier>,
        stmts: Vec<Stmt>,
    },
    ParallelBlock {
        label: Option<Identifier>,
        join: JoinKind,
        stmts: Vec<Stmt>,
    },
    IfStmt {
        cond: Box<Expr>,
        main: Box<Stmt>,
        alt: Option<Box<Stmt>>,
    },
    CaseStmt {
        kind: CaseKind,
        expr: Box<Expr>,
        items: Vec<CaseItem>,
    },
    ForStmt {
        init: Box<Stmt>,
        cond: Box<Expr>,
        step: Vec<Stmt>,
        body: Box<Stmt>,
    },
    ForeachStmt {
        array: Box<Expr>,
        vars: Vec<Option<Identifier>>,
        body: Box<Stmt>,
    },
    WhileStmt {
        cond: Box<Expr>,
        body: Box<Stmt>,
    },
    DoWhileStmt {
        body: Box<Stmt>,
        cond: Box<Expr>,
    },
    RepeatStmt {
        count: Box<Expr>,
        body: Box<Stmt>,
    },
    ForeverStmt {
        body: Box<Stmt>,
    },
    TimedStmt {
        control: TimingControl,
        stmt: Box<Stmt>,
    },
    WaitStmt {
        cond: Box<Expr>,
        stmt: Box<Stmt>,
    },
    AssertionStmt {
        kind: AssertionKind,
        cond: Box<Expr>,
        then_stmt: Option<Box<Stmt>>,
        else_stmt: Option<Box<Stmt>>,
    },
    /// A blocking or nonblocking assignment statement.
    AssignStmt {
        lhs: Box<Expr>,
        op: Option<Op>,
        rhs: Box<Expr>,
        nonblocking: bool,
    },
    VarDeclStmt(VarDecl),
    ExprStmt(Box<Expr>),
    ReturnStmt(Option<Box<Expr>>),
    BreakStmt,
    ContinueStmt,
    DisableStmt(Identifier),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaseItem {
    pub span: Span,
    /// The guard expressions; empty for the `default` arm.
    pub guards: Vec<Expr>,
    pub stmt: Stmt,
}

/// A timing control on a statement.
#[derive(Clone, Debug, PartialEq)]
pub enum TimingControl {
    /// A `#delay` control.
    Delay(Box<Expr>),
    /// An `@(...)` event control.
    Event(Vec<EventTerm>),
    /// The wildcard `@*` or `@(*)`.
    EventStar,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    Posedge,
    Negedge,
    Edge,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventTerm {
    pub edge: Option<EdgeKind>,
    pub expr: Expr,
}

// ----------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------

pub type Expr = Node<ExprData>;

#[derive(Clone, Debug, PartialEq)]
pub enum ExprData {
    /// An integer literal, decoded to its 4-state value.
    IntExpr(SVInt),
    /// A real literal.
    RealExpr(f64),
    /// A time literal, scaled to its unit.
    TimeExpr(f64, TimeUnit),
    /// A string literal with its unescaped value.
    StrExpr(Name),
    /// An unbased unsized literal such as `'0`.
    UnbasedUnsizedExpr(Logic),
    /// The `null` literal.
    NullExpr,
    /// The unbounded literal `$`.
    UnboundedExpr,
    IdentExpr(Identifier),
    SysIdentExpr(Identifier),
    /// A scoped name, `pkg::name`.
    ScopeExpr(Box<Expr>, Identifier),
    /// An element or part select.
    IndexExpr {
        indexee: Box<Expr>,
        index: Box<Expr>,
    },
    /// A `lo:hi`, `base+:width`, or `base-:width` range inside a select.
    RangeExpr {
        mode: RangeMode,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    MemberExpr {
        expr: Box<Expr>,
        name: Identifier,
    },
    CallExpr(Box<Expr>, Vec<CallArg>),
    UnaryExpr {
        op: Op,
        expr: Box<Expr>,
        postfix: bool,
    },
    BinaryExpr {
        op: Op,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    AssignExpr {
        op: Op,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    TernaryExpr {
        cond: Box<Expr>,
        true_expr: Box<Expr>,
        false_expr: Box<Expr>,
    },
    InsideExpr(Box<Expr>, Vec<ValueRange>),
    /// A concatenation `{a, b}`, with an optional replication count for the
    /// `{n{...}}` form.
    ConcatExpr {
        repeat: Option<Box<Expr>>,
        exprs: Vec<Expr>,
    },
    /// A streaming concatenation `{<< 8 {a}}`.
    StreamConcatExpr {
        reverse: bool,
        slice: Option<Box<Expr>>,
        exprs: Vec<Expr>,
    },
    EmptyQueueExpr,
    /// An assignment pattern `'{...}`.
    PatternExpr(Vec<PatternField>),
    /// A cast with an explicit type, `int'(x)`.
    CastExpr(Type, Box<Expr>),
    /// A sign cast, `signed'(x)`.
    CastSignExpr(Spanned<TypeSign>, Box<Expr>),
    /// A size cast, `n'(x)`.
    CastSizeExpr(Box<Expr>, Box<Expr>),
    /// A class or covergroup constructor call.
    NewExpr(Option<Vec<CallArg>>),
    /// A dynamic array allocation, `new [n] (init)`.
    ArrayNewExpr(Box<Expr>, Option<Box<Expr>>),
    /// A `matches` pattern predicate inside a conditional.
    MatchesExpr {
        expr: Box<Expr>,
        pattern: Box<Expr>,
    },
    /// An `expr with { ... }` clause.
    WithExpr(Box<Expr>, Box<Expr>),
    /// Placeholder produced by error recovery.
    ErrorExpr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeMode {
    /// A constant range `[lo:hi]`.
    Absolute,
    /// An indexed part select counting up, `[base+:width]`.
    RelativeUp,
    /// An indexed part select counting down, `[base-:width]`.
    RelativeDown,
}

/// An argument in a call or parameter assignment, possibly named.
#[derive(Clone, Debug, PartialEq)]
pub struct CallArg {
    pub span: Span,
    pub name: Option<Identifier>,
    pub expr: Option<Expr>,
}

/// A single value or a range in an `inside` set.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueRange {
    Single(Expr),
    Range { lo: Expr, hi: Expr, span: Span },
}

/// A field in an assignment pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternField {
    pub span: Span,
    pub data: PatternFieldData,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatternFieldData {
    /// A `default: expr` field.
    Default(Box<Expr>),
    /// A keyed `member: expr` field.
    Member(Box<Expr>, Box<Expr>),
    /// A positional field.
    Expr(Box<Expr>),
    /// A repeated field `expr {a, b}`.
    Repeat(Box<Expr>, Vec<Expr>),
}

impl HasDesc for ItemData {
    fn desc(&self) -> &'static str {
        match self {
            ItemData::ModuleDecl(decl) => match decl.kind {
                ModuleKind::Module => "module declaration",
                ModuleKind::Interface => "interface declaration",
                ModuleKind::Program => "program declaration",
            },
            ItemData::PackageDecl(_) => "package declaration",
            ItemData::ClassDecl(_) => "class declaration",
            ItemData::ImportDecl(_) => "import declaration",
            ItemData::ParamDecl(_) => "parameter declaration",
            ItemData::TypedefDecl(_) => "typedef",
            ItemData::VarDecl(_) => "variable declaration",
            ItemData::NetDecl(_) => "net declaration",
            ItemData::Inst(_) => "instantiation",
            ItemData::ContAssign(_) => "continuous assignment",
            ItemData::Procedure(_) => "procedure",
            ItemData::SubroutineDecl(_) => "subroutine declaration",
            ItemData::GenvarDecl(_) => "genvar declaration",
            ItemData::GenerateRegion(_) => "generate region",
            ItemData::GenerateIf(_) => "conditional generate",
            ItemData::GenerateFor(_) => "loop generate",
            ItemData::GenerateCase(_) => "case generate",
        }
    }
}

impl HasDesc for ExprData {
    fn desc(&self) -> &'static str {
        match self {
            IntExpr(_) => "integer literal",
            RealExpr(_) => "real literal",
            TimeExpr(..) => "time literal",
            StrExpr(_) => "string literal",
            UnbasedUnsizedExpr(_) => "unbased unsized literal",
            NullExpr => "null literal",
            UnboundedExpr => "unbounded literal",
            IdentExpr(_) => "identifier",
            SysIdentExpr(_) => "system identifier",
            ScopeExpr(..) => "scoped name",
            IndexExpr { .. } => "index expression",
            RangeExpr { .. } => "range expression",
            MemberExpr { .. } => "member access",
            CallExpr(..) => "call expression",
            UnaryExpr { .. } => "unary expression",
            BinaryExpr { .. } => "binary expression",
            AssignExpr { .. } => "assignment expression",
            TernaryExpr { .. } => "conditional expression",
            InsideExpr(..) => "inside expression",
            ConcatExpr { .. } => "concatenation",
            StreamConcatExpr { .. } => "streaming concatenation",
            EmptyQueueExpr => "empty queue",
            PatternExpr(_) => "assignment pattern",
            CastExpr(..) => "cast expression",
            CastSignExpr(..) => "sign cast",
            CastSizeExpr(..) => "size cast",
            NewExpr(_) => "constructor call",
            ArrayNewExpr(..) => "array allocation",
            MatchesExpr { .. } => "matches pattern",
            WithExpr(..) => "with expression",
            ErrorExpr => "invalid expression",
        }
    }
}
