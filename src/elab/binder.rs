// Copyright (c) 2024-2026 The shannon developers

//! The expression binder.
//!
//! Binding turns an [`ast::Expr`] into a typed [`Expr`] tree: names are
//! resolved against the scope model, operator result types are computed
//! per the integer promotion rules, and implicit conversions are inserted
//! wherever the producer type differs from the context type. Failed
//! bindings produce a `Bad` expression carrying the error type, which
//! downstream consumers silently propagate.

use crate::compilation::{Compilation, SystemFunc};
use crate::eval::{ConstantValue, EvalContext};
use crate::symbols::*;
use crate::ty::*;
use shannon_common::errors::*;
use shannon_common::source::Span;
use shannon_common::svint::SVInt;
use shannon_common::util::HasDesc;
use shannon_syntax::ast;
use shannon_syntax::token::Op;

/// A bound, typed expression.
pub struct Expr<'t> {
    pub ty: Type<'t>,
    pub span: Span,
    pub kind: ExprKind<'t>,
}

/// The argument of a system subroutine: some of them introspect types
/// rather than values.
pub enum SystemArg<'t> {
    Expr(Expr<'t>),
    Type(Type<'t>),
}

pub enum ExprKind<'t> {
    /// A literal with its constant value.
    Literal(ConstantValue),
    /// A reference to a named symbol.
    NamedValue(SymbolId),
    ElementSelect {
        value: Box<Expr<'t>>,
        index: Box<Expr<'t>>,
    },
    RangeSelect {
        value: Box<Expr<'t>>,
        /// The bit offset of the selected slice's LSB within the value.
        lsb: u32,
        width: u32,
    },
    MemberAccess {
        value: Box<Expr<'t>>,
        field: usize,
    },
    Concat {
        repeat: u32,
        exprs: Vec<Expr<'t>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr<'t>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr<'t>>,
        rhs: Box<Expr<'t>>,
    },
    Ternary {
        cond: Box<Expr<'t>>,
        true_expr: Box<Expr<'t>>,
        false_expr: Box<Expr<'t>>,
    },
    Inside {
        value: Box<Expr<'t>>,
        ranges: Vec<(Expr<'t>, Option<Expr<'t>>)>,
    },
    SystemCall {
        func: SystemFunc,
        arg: Box<SystemArg<'t>>,
    },
    UserCall {
        subroutine: SymbolId,
        args: Vec<Expr<'t>>,
    },
    Conversion {
        kind: ConversionKind,
        operand: Box<Expr<'t>>,
    },
    Assignment {
        lhs: Box<Expr<'t>>,
        rhs: Box<Expr<'t>>,
    },
    /// An assignment pattern bound against a struct or array type.
    Aggregate(Vec<Expr<'t>>),
    /// Produced by failed bindings; carries the error type and suppresses
    /// cascading diagnostics.
    Bad,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
    LogicNot,
    RedAnd,
    RedNand,
    RedOr,
    RedNor,
    RedXor,
    RedXnor,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    LShr,
    AShr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Neq,
    CaseEq,
    CaseNeq,
    WildcardEq,
    WildcardNeq,
    LogicAnd,
    LogicOr,
    LogicImpl,
    LogicEquiv,
    BitAnd,
    BitOr,
    BitXor,
    BitXnor,
}

/// The flavor of an inserted conversion node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConversionKind {
    WidthExtend,
    Truncate,
    SignChange,
    IntToFloat,
    FloatToInt,
    StringToInt,
}

impl<'t> Expr<'t> {
    fn new(ty: Type<'t>, span: Span, kind: ExprKind<'t>) -> Expr<'t> {
        Expr { ty, span, kind }
    }

    pub fn is_bad(&self) -> bool {
        matches!(self.kind, ExprKind::Bad)
    }
}

/// Binds expressions within one scope.
pub struct Binder<'a, 't> {
    pub cx: &'a Compilation<'t>,
    pub scope: SymbolId,
}

impl<'a, 't> Binder<'a, 't> {
    pub fn new(cx: &'a Compilation<'t>, scope: SymbolId) -> Binder<'a, 't> {
        Binder { cx, scope }
    }

    fn bad(&self, span: Span) -> Expr<'t> {
        Expr::new(self.cx.error_type(), span, ExprKind::Bad)
    }

    /// Bind an expression self-determined.
    pub fn bind(&self, ast: &ast::Expr) -> Expr<'t> {
        let span = ast.span;
        match &ast.data {
            ast::ExprData::IntExpr(v) => {
                let ty = self.literal_type(v);
                Expr::new(ty, span, ExprKind::Literal(ConstantValue::Int(v.clone())))
            }
            ast::ExprData::RealExpr(v) => Expr::new(
                self.cx.real_type(),
                span,
                ExprKind::Literal(ConstantValue::Real(*v)),
            ),
            ast::ExprData::TimeExpr(v, _) => Expr::new(
                self.cx.intern_type(TypeKind::Floating(FloatingKind::RealTime)),
                span,
                ExprKind::Literal(ConstantValue::Real(*v)),
            ),
            ast::ExprData::StrExpr(name) => Expr::new(
                self.cx.string_type(),
                span,
                ExprKind::Literal(ConstantValue::Str(name.as_str().to_string())),
            ),
            ast::ExprData::UnbasedUnsizedExpr(logic) => {
                let ty = self.cx.make_vector(1, false, true);
                Expr::new(
                    ty,
                    span,
                    ExprKind::Literal(ConstantValue::Int(SVInt::filled(1, *logic))),
                )
            }
            ast::ExprData::NullExpr => Expr::new(
                self.cx.intern_type(TypeKind::Null),
                span,
                ExprKind::Literal(ConstantValue::Null),
            ),
            ast::ExprData::UnboundedExpr => Expr::new(
                self.cx.int_type(),
                span,
                ExprKind::Literal(ConstantValue::Unbounded),
            ),

            ast::ExprData::IdentExpr(ident) => self.bind_name(ident, span),
            ast::ExprData::ScopeExpr(base, name) => self.bind_scoped(base, *name, span),
            ast::ExprData::SysIdentExpr(ident) => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!(
                        "system name `${}` can only be called",
                        ident.name
                    ))
                    .code(DiagCode::NotAValue)
                    .span(span),
                );
                self.bad(span)
            }

            ast::ExprData::MemberExpr { expr, name } => self.bind_member(expr, *name, span),
            ast::ExprData::IndexExpr { indexee, index } => self.bind_index(indexee, index, span),

            ast::ExprData::CallExpr(callee, args) => self.bind_call(callee, args, span),

            ast::ExprData::UnaryExpr { op, expr, postfix } => {
                self.bind_unary(*op, expr, *postfix, span)
            }
            ast::ExprData::BinaryExpr { op, lhs, rhs } => self.bind_binary(*op, lhs, rhs, span),
            ast::ExprData::AssignExpr { op, lhs, rhs } => {
                self.bind_assignment(*op, lhs, rhs, span)
            }
            ast::ExprData::TernaryExpr {
                cond,
                true_expr,
                false_expr,
            } => {
                let cond = self.bind(cond);
                let t = self.bind(true_expr);
                let f = self.bind(false_expr);
                if t.ty.is_error() || f.ty.is_error() || cond.ty.is_error() {
                    return self.bad(span);
                }
                let ty = self.cx.binary_arith_type(t.ty, f.ty, false);
                let t = self.convert(t, ty, false);
                let f = self.convert(f, ty, false);
                Expr::new(
                    ty,
                    span,
                    ExprKind::Ternary {
                        cond: Box::new(cond),
                        true_expr: Box::new(t),
                        false_expr: Box::new(f),
                    },
                )
            }

            ast::ExprData::InsideExpr(value, ranges) => {
                let value = self.bind(value);
                let mut bound = Vec::new();
                for r in ranges {
                    match r {
                        ast::ValueRange::Single(e) => bound.push((self.bind(e), None)),
                        ast::ValueRange::Range { lo, hi, .. } => {
                            bound.push((self.bind(lo), Some(self.bind(hi))))
                        }
                    }
                }
                let ty = self.cx.make_vector(1, false, true);
                Expr::new(
                    ty,
                    span,
                    ExprKind::Inside {
                        value: Box::new(value),
                        ranges: bound,
                    },
                )
            }

            ast::ExprData::ConcatExpr { repeat, exprs } => {
                self.bind_concat(repeat.as_deref(), exprs, span)
            }
            ast::ExprData::StreamConcatExpr { exprs, .. } => self.bind_concat(None, exprs, span),
            ast::ExprData::EmptyQueueExpr => {
                self.cx.diag.emit(
                    DiagBuilder2::error("empty queue has no value in this context")
                        .code(DiagCode::NotAValue)
                        .span(span),
                );
                self.bad(span)
            }

            ast::ExprData::CastExpr(ty_ast, expr) => {
                let ty = self.cx.resolve_type(ty_ast, self.scope);
                let operand = self.bind(expr);
                self.convert(operand, ty, true)
            }
            ast::ExprData::CastSignExpr(sign, expr) => {
                let operand = self.bind(expr);
                if operand.ty.is_error() {
                    return operand;
                }
                let signed = sign.value == ast::TypeSign::Signed;
                let ty = self.cx.make_vector(
                    operand.ty.width().max(1),
                    signed,
                    operand.ty.is_four_state(),
                );
                let span_ty = ty;
                Expr::new(
                    span_ty,
                    span,
                    ExprKind::Conversion {
                        kind: ConversionKind::SignChange,
                        operand: Box::new(operand),
                    },
                )
            }
            ast::ExprData::CastSizeExpr(size, expr) => {
                let operand = self.bind(expr);
                if operand.ty.is_error() {
                    return operand;
                }
                // The size may itself be a named constant.
                let size = self.bind(size);
                let width = match self.cx.eval_to_u32(&size, DiagCode::ValueMustBePositive) {
                    Some(w) if w >= 1 => w,
                    _ => return self.bad(span),
                };
                let ty =
                    self.cx
                        .make_vector(width, operand.ty.is_signed(), operand.ty.is_four_state());
                self.convert(Expr { span, ..operand }, ty, true)
            }

            ast::ExprData::PatternExpr(_) => {
                self.cx.diag.emit(
                    DiagBuilder2::error(
                        "assignment pattern requires a type context to be interpreted",
                    )
                    .code(DiagCode::NoImplicitConversion)
                    .span(span),
                );
                self.bad(span)
            }

            ast::ExprData::RangeExpr { .. } => {
                // Range expressions only appear inside selects; anywhere
                // else they are a parse artifact.
                self.cx.diag.emit(
                    DiagBuilder2::error("range is not a value")
                        .code(DiagCode::NotAValue)
                        .span(span),
                );
                self.bad(span)
            }

            ast::ExprData::NewExpr(_)
            | ast::ExprData::ArrayNewExpr(..)
            | ast::ExprData::MatchesExpr { .. }
            | ast::ExprData::WithExpr(..) => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!(
                        "{} is not supported in this context",
                        ast.data.desc()
                    ))
                    .code(DiagCode::NotAValue)
                    .span(span),
                );
                self.bad(span)
            }

            ast::ExprData::ErrorExpr => self.bad(span),
        }
    }

    /// Bind an expression against a known context type, converting the
    /// result. Assignment patterns take their shape from the type.
    pub fn bind_with_type(&self, ast: &ast::Expr, ty: Type<'t>) -> Expr<'t> {
        if let ast::ExprData::PatternExpr(fields) = &ast.data {
            return self.bind_pattern(fields, ty, ast.span);
        }
        let bound = self.bind(ast);
        self.convert_assignment(bound, ty)
    }

    fn bind_pattern(&self, fields: &[ast::PatternField], ty: Type<'t>, span: Span) -> Expr<'t> {
        let field_types: Vec<Type<'t>> = match ty.resolve() {
            TypeKind::Struct(s) => s.fields.iter().map(|f| f.ty).collect(),
            TypeKind::PackedArray { elem, range } => {
                std::iter::repeat(*elem).take(range.width() as usize).collect()
            }
            _ => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!(
                        "assignment pattern cannot target `{}`",
                        ty
                    ))
                    .code(DiagCode::NoImplicitConversion)
                    .span(span),
                );
                return self.bad(span);
            }
        };
        let mut elements = Vec::new();
        let mut default: Option<&ast::Expr> = None;
        for field in fields {
            match &field.data {
                ast::PatternFieldData::Expr(e) => elements.push(&**e),
                // Keyed fields are taken positionally here; full key
                // resolution belongs to the unpacked-aggregate layer.
                ast::PatternFieldData::Member(_, e) => elements.push(&**e),
                ast::PatternFieldData::Default(e) => default = Some(e),
                ast::PatternFieldData::Repeat(_, exprs) => {
                    for e in exprs {
                        elements.push(e);
                    }
                }
            }
        }
        let mut bound = Vec::new();
        for (idx, &fty) in field_types.iter().enumerate() {
            let init = elements.get(idx).copied().or(default);
            match init {
                Some(e) => bound.push(self.bind_with_type(e, fty)),
                None => {
                    self.cx.diag.emit(
                        DiagBuilder2::error(format!(
                            "assignment pattern is missing a value for element {}",
                            idx
                        ))
                        .code(DiagCode::WrongNumberOfArguments)
                        .span(span),
                    );
                    return self.bad(span);
                }
            }
        }
        Expr::new(ty, span, ExprKind::Aggregate(bound))
    }

    /// The self-determined type of an integer literal: plain decimal
    /// literals are `int`, everything else is a packed vector of its size.
    fn literal_type(&self, v: &SVInt) -> Type<'t> {
        if v.width() == 32 && v.is_signed() && !v.has_unknown() {
            self.cx.int_type()
        } else {
            self.cx.make_vector(v.width(), v.is_signed(), true)
        }
    }

    fn bind_name(&self, ident: &ast::Identifier, span: Span) -> Expr<'t> {
        let found = self
            .cx
            .lookup_name(self.scope, ident.name, span, LookupFlags::empty())
            .or_else(|| {
                // Hierarchical names start from the root instances.
                self.cx
                    .top_instances()
                    .into_iter()
                    .find(|&id| self.cx.symbol(id).name == ident.name)
            });
        let id = match found {
            Some(id) => id,
            None => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!("`{}` is not declared", ident.name))
                        .code(DiagCode::UnknownName)
                        .span(span),
                );
                return self.bad(span);
            }
        };
        let sym = self.cx.symbol(id);
        match &sym.kind {
            SymbolKind::Variable(_)
            | SymbolKind::Net(_)
            | SymbolKind::Parameter(_)
            | SymbolKind::EnumVariant(_)
            | SymbolKind::Genvar
            | SymbolKind::Instance { .. } => {
                let ty = self.cx.type_of_symbol(id);
                Expr::new(ty, span, ExprKind::NamedValue(id))
            }
            SymbolKind::Typedef(_) => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!("`{}` is a type, not a value", ident.name))
                        .code(DiagCode::NotAValue)
                        .span(span),
                );
                self.bad(span)
            }
            _ => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!("`{}` cannot be used as a value", ident.name))
                        .code(DiagCode::NotAValue)
                        .span(span),
                );
                self.bad(span)
            }
        }
    }

    fn bind_scoped(&self, base: &ast::Expr, name: ast::Identifier, span: Span) -> Expr<'t> {
        let pkg = match &base.data {
            ast::ExprData::IdentExpr(ident) => ident.name,
            _ => {
                self.cx.diag.emit(
                    DiagBuilder2::error("expected a package name before `::`")
                        .code(DiagCode::NotAScope)
                        .span(base.span),
                );
                return self.bad(span);
            }
        };
        match self.cx.package_member(pkg, name.name) {
            Some(id) => {
                let ty = self.cx.type_of_symbol(id);
                Expr::new(ty, span, ExprKind::NamedValue(id))
            }
            None => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!("`{}::{}` is not declared", pkg, name.name))
                        .code(DiagCode::UnknownName)
                        .span(span),
                );
                self.bad(span)
            }
        }
    }

    fn bind_member(&self, base: &ast::Expr, name: ast::Identifier, span: Span) -> Expr<'t> {
        let value = self.bind(base);
        if value.ty.is_error() {
            return value;
        }

        // Hierarchical access into an instance.
        if let ExprKind::NamedValue(id) = &value.kind {
            let id = *id;
            if let SymbolKind::Instance { .. } = &self.cx.symbol(id).kind {
                match self.cx.scope_member(id, name.name) {
                    Some(member) => {
                        let ty = self.cx.type_of_symbol(member);
                        return Expr::new(ty, span, ExprKind::NamedValue(member));
                    }
                    None => {
                        self.cx.diag.emit(
                            DiagBuilder2::error(format!(
                                "`{}` has no member `{}`",
                                self.cx.symbol(id).name,
                                name.name
                            ))
                            .code(DiagCode::UnknownMember)
                            .span(span),
                        );
                        return self.bad(span);
                    }
                }
            }
        }

        match value.ty.struct_fields() {
            Some(fields) => match fields.iter().position(|f| f.name == name.name) {
                Some(idx) => {
                    let ty = fields[idx].ty;
                    Expr::new(
                        ty,
                        span,
                        ExprKind::MemberAccess {
                            value: Box::new(value),
                            field: idx,
                        },
                    )
                }
                None => {
                    self.cx.diag.emit(
                        DiagBuilder2::error(format!(
                            "`{}` has no field named `{}`",
                            value.ty, name.name
                        ))
                        .code(DiagCode::UnknownMember)
                        .span(span),
                    );
                    self.bad(span)
                }
            },
            None => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!(
                        "cannot access a member of `{}`, which is not a struct or union",
                        value.ty
                    ))
                    .code(DiagCode::MemberAccessNotStruct)
                    .span(span),
                );
                self.bad(span)
            }
        }
    }

    fn bind_index(&self, base: &ast::Expr, index: &ast::Expr, span: Span) -> Expr<'t> {
        let value = self.bind(base);
        if value.ty.is_error() {
            return value;
        }
        if !value.ty.is_integral() {
            self.cx.diag.emit(
                DiagBuilder2::error(format!("cannot index a value of type `{}`", value.ty))
                    .code(DiagCode::IndexMustBeIntegral)
                    .span(span),
            );
            return self.bad(span);
        }

        // A part select: the bounds must be constant.
        if let ast::ExprData::RangeExpr { mode, lhs, rhs } = &index.data {
            let range = match value.ty.get_range() {
                Some(range) => range,
                None => {
                    self.cx.diag.emit(
                        DiagBuilder2::error(format!("cannot slice `{}`", value.ty))
                            .code(DiagCode::CannotIndexScalar)
                            .span(span),
                    );
                    return self.bad(span);
                }
            };
            let l = self.bind(lhs);
            let r = self.bind(rhs);
            let (lsb, width) = match mode {
                ast::RangeMode::Absolute => {
                    let msb = self.cx.eval_to_i32(&l, DiagCode::ExpressionNotConstant);
                    let lsb = self.cx.eval_to_i32(&r, DiagCode::ExpressionNotConstant);
                    match (msb, lsb) {
                        (Some(msb), Some(lsb)) => {
                            let width = (msb - lsb).abs() as u32 + 1;
                            let low = msb.min(lsb);
                            ((low - range.low()) as u32, width)
                        }
                        _ => return self.bad(span),
                    }
                }
                ast::RangeMode::RelativeUp | ast::RangeMode::RelativeDown => {
                    let base_idx = self.cx.eval_to_i32(&l, DiagCode::ExpressionNotConstant);
                    let width = self.cx.eval_to_u32(&r, DiagCode::ValueMustBePositive);
                    match (base_idx, width) {
                        (Some(b), Some(w)) if w >= 1 => {
                            let low = if *mode == ast::RangeMode::RelativeUp {
                                b
                            } else {
                                b - w as i32 + 1
                            };
                            ((low - range.low()) as u32, w)
                        }
                        _ => return self.bad(span),
                    }
                }
            };
            let four_state = value.ty.is_four_state();
            let ty = self.cx.make_vector(width, false, four_state);
            return Expr::new(
                ty,
                span,
                ExprKind::RangeSelect {
                    value: Box::new(value),
                    lsb,
                    width,
                },
            );
        }

        // A plain element select.
        if value.ty.is_scalar() {
            self.cx.diag.emit(
                DiagBuilder2::error("cannot index a scalar")
                    .code(DiagCode::CannotIndexScalar)
                    .span(span),
            );
            return self.bad(span);
        }
        let index = self.bind(index);
        if !index.ty.is_integral() && !index.ty.is_error() {
            self.cx.diag.emit(
                DiagBuilder2::error("index must be an integral value")
                    .code(DiagCode::IndexMustBeIntegral)
                    .span(index.span),
            );
            return self.bad(span);
        }
        let elem = match value.ty.element_type() {
            Some(elem) => elem,
            None => self.cx.make_vector(1, false, value.ty.is_four_state()),
        };
        Expr::new(
            elem,
            span,
            ExprKind::ElementSelect {
                value: Box::new(value),
                index: Box::new(index),
            },
        )
    }

    fn bind_call(&self, callee: &ast::Expr, args: &[ast::CallArg], span: Span) -> Expr<'t> {
        match &callee.data {
            ast::ExprData::SysIdentExpr(ident) => self.bind_system_call(ident, args, span),
            ast::ExprData::IdentExpr(ident) => {
                let found =
                    self.cx
                        .lookup_name(self.scope, ident.name, span, LookupFlags::CALLABLE);
                match found {
                    Some(id) => {
                        let sym = self.cx.symbol(id);
                        match &sym.kind {
                            SymbolKind::Subroutine(decl) => {
                                let ret = match &decl.ret {
                                    Some(ty) => self.cx.resolve_type(ty, self.scope),
                                    None => self.cx.void_type(),
                                };
                                let mut bound = Vec::new();
                                for arg in args {
                                    if let Some(e) = &arg.expr {
                                        bound.push(self.bind(e));
                                    }
                                }
                                Expr::new(
                                    ret,
                                    span,
                                    ExprKind::UserCall {
                                        subroutine: id,
                                        args: bound,
                                    },
                                )
                            }
                            _ => {
                                self.cx.diag.emit(
                                    DiagBuilder2::error(format!(
                                        "`{}` is not a function or task",
                                        ident.name
                                    ))
                                    .code(DiagCode::NotACallable)
                                    .span(span),
                                );
                                self.bad(span)
                            }
                        }
                    }
                    None => {
                        self.cx.diag.emit(
                            DiagBuilder2::error(format!("`{}` is not declared", ident.name))
                                .code(DiagCode::UnknownName)
                                .span(span),
                        );
                        self.bad(span)
                    }
                }
            }
            _ => {
                self.cx.diag.emit(
                    DiagBuilder2::error("this expression cannot be called")
                        .code(DiagCode::NotACallable)
                        .span(span),
                );
                self.bad(span)
            }
        }
    }

    fn bind_system_call(
        &self,
        ident: &ast::Identifier,
        args: &[ast::CallArg],
        span: Span,
    ) -> Expr<'t> {
        let func = match self.cx.system_functions.get(&ident.name) {
            Some(&func) => func,
            None => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!("unknown system function `${}`", ident.name))
                        .code(DiagCode::UnknownSystemFunction)
                        .span(span),
                );
                return self.bad(span);
            }
        };
        let exprs: Vec<&ast::Expr> = args.iter().filter_map(|a| a.expr.as_ref()).collect();
        if exprs.len() != 1 {
            self.cx.diag.emit(
                DiagBuilder2::error(format!(
                    "`${}` takes exactly one argument, got {}",
                    ident.name,
                    exprs.len()
                ))
                .code(DiagCode::WrongNumberOfArguments)
                .span(span),
            );
            return self.bad(span);
        }
        // The argument may name a type instead of a value.
        let arg = match self.try_bind_type_arg(exprs[0]) {
            Some(ty) => SystemArg::Type(ty),
            None => SystemArg::Expr(self.bind(exprs[0])),
        };
        Expr::new(
            self.cx.int_type(),
            span,
            ExprKind::SystemCall {
                func,
                arg: Box::new(arg),
            },
        )
    }

    /// If the expression is a bare name denoting a type, resolve it.
    fn try_bind_type_arg(&self, e: &ast::Expr) -> Option<Type<'t>> {
        if let ast::ExprData::IdentExpr(ident) = &e.data {
            let found = self
                .cx
                .lookup_name(self.scope, ident.name, e.span, LookupFlags::TYPE)?;
            if let SymbolKind::Typedef(_) = &self.cx.symbol(found).kind {
                return Some(self.cx.type_of_symbol(found));
            }
        }
        None
    }

    fn bind_unary(&self, op: Op, operand: &ast::Expr, postfix: bool, span: Span) -> Expr<'t> {
        let operand = self.bind(operand);
        if operand.ty.is_error() {
            return self.bad(span);
        }
        let op = match (op, postfix) {
            (Op::Add, _) => UnaryOp::Plus,
            (Op::Sub, _) => UnaryOp::Minus,
            (Op::BitNot, _) => UnaryOp::BitNot,
            (Op::LogicNot, _) => UnaryOp::LogicNot,
            (Op::BitAnd, _) => UnaryOp::RedAnd,
            (Op::BitNand, _) => UnaryOp::RedNand,
            (Op::BitOr, _) => UnaryOp::RedOr,
            (Op::BitNor, _) => UnaryOp::RedNor,
            (Op::BitXor, _) => UnaryOp::RedXor,
            (Op::BitXnor, _) | (Op::BitNxor, _) => UnaryOp::RedXnor,
            (Op::Inc, false) => UnaryOp::PreInc,
            (Op::Inc, true) => UnaryOp::PostInc,
            (Op::Dec, false) => UnaryOp::PreDec,
            (Op::Dec, true) => UnaryOp::PostDec,
            _ => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!("`{}` is not a unary operator", op))
                        .code(DiagCode::BadUnaryOperand)
                        .span(span),
                );
                return self.bad(span);
            }
        };
        let ty = match op {
            UnaryOp::Plus | UnaryOp::Minus => {
                if !operand.ty.is_numeric() {
                    return self.bad_unary_operand(op, &operand, span);
                }
                operand.ty
            }
            UnaryOp::BitNot => {
                if !operand.ty.is_integral() {
                    return self.bad_unary_operand(op, &operand, span);
                }
                operand.ty
            }
            UnaryOp::LogicNot => self.cx.make_vector(1, false, operand.ty.is_four_state()),
            UnaryOp::RedAnd
            | UnaryOp::RedNand
            | UnaryOp::RedOr
            | UnaryOp::RedNor
            | UnaryOp::RedXor
            | UnaryOp::RedXnor => {
                if !operand.ty.is_integral() {
                    return self.bad_unary_operand(op, &operand, span);
                }
                self.cx.make_vector(1, false, operand.ty.is_four_state())
            }
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                self.require_lvalue(&operand);
                operand.ty
            }
        };
        Expr::new(
            ty,
            span,
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        )
    }

    fn bad_unary_operand(&self, op: UnaryOp, operand: &Expr<'t>, span: Span) -> Expr<'t> {
        self.cx.diag.emit(
            DiagBuilder2::error(format!(
                "operator `{:?}` cannot be applied to a value of type `{}`",
                op, operand.ty
            ))
            .code(DiagCode::BadUnaryOperand)
            .span(span),
        );
        self.bad(span)
    }

    fn bind_binary(&self, op: Op, lhs: &ast::Expr, rhs: &ast::Expr, span: Span) -> Expr<'t> {
        let l = self.bind(lhs);
        let r = self.bind(rhs);
        if l.ty.is_error() || r.ty.is_error() {
            return self.bad(span);
        }
        let op = match op {
            Op::Add => BinaryOp::Add,
            Op::Sub => BinaryOp::Sub,
            Op::Mul => BinaryOp::Mul,
            Op::Div => BinaryOp::Div,
            Op::Mod => BinaryOp::Mod,
            Op::Pow => BinaryOp::Pow,
            Op::LogicShL => BinaryOp::Shl,
            Op::ArithShL => BinaryOp::Shl,
            Op::LogicShR => BinaryOp::LShr,
            Op::ArithShR => BinaryOp::AShr,
            Op::Lt => BinaryOp::Lt,
            Op::Leq => BinaryOp::Le,
            Op::Gt => BinaryOp::Gt,
            Op::Geq => BinaryOp::Ge,
            Op::LogicEq => BinaryOp::Eq,
            Op::LogicNeq => BinaryOp::Neq,
            Op::CaseEq => BinaryOp::CaseEq,
            Op::CaseNeq => BinaryOp::CaseNeq,
            Op::WildcardEq => BinaryOp::WildcardEq,
            Op::WildcardNeq => BinaryOp::WildcardNeq,
            Op::LogicAnd => BinaryOp::LogicAnd,
            Op::LogicOr => BinaryOp::LogicOr,
            Op::LogicImpl => BinaryOp::LogicImpl,
            Op::LogicEquiv => BinaryOp::LogicEquiv,
            Op::BitAnd => BinaryOp::BitAnd,
            Op::BitOr => BinaryOp::BitOr,
            Op::BitXor => BinaryOp::BitXor,
            Op::BitXnor | Op::BitNxor => BinaryOp::BitXnor,
            _ => {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!("`{}` is not a binary operator", op))
                        .code(DiagCode::BadBinaryOperands)
                        .span(span),
                );
                return self.bad(span);
            }
        };

        match op {
            // Context-determined arithmetic and bitwise operators: both
            // operands are promoted to the result type.
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::BitXnor => {
                if !self.check_numeric_operands(op, &l, &r, span) {
                    return self.bad(span);
                }
                let force = matches!(op, BinaryOp::Div | BinaryOp::Mod);
                let ty = self.cx.binary_arith_type(l.ty, r.ty, force);
                let l = self.convert(l, ty, false);
                let r = self.convert(r, ty, false);
                Expr::new(
                    ty,
                    span,
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                )
            }
            // The power operator promotes its left operand only; the
            // exponent stays self-determined.
            BinaryOp::Pow => {
                if !self.check_numeric_operands(op, &l, &r, span) {
                    return self.bad(span);
                }
                let ty = self.cx.binary_arith_type(l.ty, l.ty, true);
                let l = self.convert(l, ty, false);
                Expr::new(
                    ty,
                    span,
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                )
            }
            // Shifts promote the left operand; the amount is
            // self-determined.
            BinaryOp::Shl | BinaryOp::LShr | BinaryOp::AShr => {
                if !self.check_numeric_operands(op, &l, &r, span) {
                    return self.bad(span);
                }
                let ty = l.ty;
                Expr::new(
                    ty,
                    span,
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                )
            }
            // Comparisons promote both sides to a common type and yield a
            // single bit.
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Neq
            | BinaryOp::CaseEq
            | BinaryOp::CaseNeq
            | BinaryOp::WildcardEq
            | BinaryOp::WildcardNeq => {
                if !self.check_numeric_operands(op, &l, &r, span) {
                    return self.bad(span);
                }
                let common = self.cx.binary_arith_type(l.ty, r.ty, false);
                let four_state = common.is_four_state()
                    && !matches!(op, BinaryOp::CaseEq | BinaryOp::CaseNeq);
                let l = self.convert(l, common, false);
                let r = self.convert(r, common, false);
                let ty = self.cx.make_vector(1, false, four_state);
                Expr::new(
                    ty,
                    span,
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                )
            }
            // Logical operators evaluate their operands self-determined.
            BinaryOp::LogicAnd | BinaryOp::LogicOr | BinaryOp::LogicImpl | BinaryOp::LogicEquiv => {
                let four_state = l.ty.is_four_state() || r.ty.is_four_state();
                let ty = self.cx.make_vector(1, false, four_state);
                Expr::new(
                    ty,
                    span,
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                )
            }
        }
    }

    fn check_numeric_operands(
        &self,
        op: BinaryOp,
        l: &Expr<'t>,
        r: &Expr<'t>,
        span: Span,
    ) -> bool {
        if l.ty.is_numeric() && r.ty.is_numeric() {
            return true;
        }
        self.cx.diag.emit(
            DiagBuilder2::error(format!(
                "operator `{:?}` cannot be applied to `{}` and `{}`",
                op, l.ty, r.ty
            ))
            .code(DiagCode::BadBinaryOperands)
            .span(span),
        );
        false
    }

    fn bind_assignment(&self, op: Op, lhs: &ast::Expr, rhs: &ast::Expr, span: Span) -> Expr<'t> {
        let l = self.bind(lhs);
        if l.ty.is_error() {
            return self.bad(span);
        }
        self.require_lvalue(&l);
        // Compound assignments expand into the binary operation first.
        let rhs_bound = if op == Op::Assign {
            self.bind_with_type(rhs, l.ty)
        } else {
            let bin_op = strip_assign_op(op);
            let combined = ast::Expr::new(
                span,
                ast::ExprData::BinaryExpr {
                    op: bin_op,
                    lhs: Box::new(lhs.clone()),
                    rhs: Box::new(rhs.clone()),
                },
            );
            let bound = self.bind(&combined);
            self.convert_assignment(bound, l.ty)
        };
        let ty = l.ty;
        Expr::new(
            ty,
            span,
            ExprKind::Assignment {
                lhs: Box::new(l),
                rhs: Box::new(rhs_bound),
            },
        )
    }

    fn bind_concat(
        &self,
        repeat: Option<&ast::Expr>,
        exprs: &[ast::Expr],
        span: Span,
    ) -> Expr<'t> {
        let repeat_count = match repeat {
            Some(r) => {
                let bound = self.bind(r);
                match self.cx.eval_to_u32(&bound, DiagCode::ValueMustBePositive) {
                    Some(n) if n >= 1 => n,
                    Some(_) => {
                        self.cx.diag.emit(
                            DiagBuilder2::error("replication count must be positive")
                                .code(DiagCode::ValueMustBePositive)
                                .span(r.span),
                        );
                        return self.bad(span);
                    }
                    None => return self.bad(span),
                }
            }
            None => 1,
        };
        let mut bound = Vec::new();
        let mut width = 0u32;
        let mut four_state = false;
        for e in exprs {
            let b = self.bind(e);
            if b.ty.is_error() {
                return self.bad(span);
            }
            if !b.ty.is_integral() {
                self.cx.diag.emit(
                    DiagBuilder2::error(format!(
                        "concatenation operand must be integral, not `{}`",
                        b.ty
                    ))
                    .code(DiagCode::BadBinaryOperands)
                    .span(b.span),
                );
                return self.bad(span);
            }
            width += b.ty.width();
            four_state |= b.ty.is_four_state();
            bound.push(b);
        }
        let ty = self.cx.make_vector(width.max(1) * repeat_count, false, four_state);
        Expr::new(
            ty,
            span,
            ExprKind::Concat {
                repeat: repeat_count,
                exprs: bound,
            },
        )
    }

    /// LValues are exactly: named values, element selects, range selects,
    /// and member accesses of lvalues.
    fn require_lvalue(&self, expr: &Expr<'t>) {
        if !is_lvalue(expr) && !expr.ty.is_error() {
            self.cx.diag.emit(
                DiagBuilder2::error("expression is not assignable")
                    .code(DiagCode::ExpressionNotAssignable)
                    .span(expr.span),
            );
        }
    }

    /// Insert a conversion if the expression's type differs from the
    /// context type. `explicit` marks user-written casts, which are allowed
    /// to do more.
    pub fn convert(&self, expr: Expr<'t>, ty: Type<'t>, explicit: bool) -> Expr<'t> {
        if expr.ty.is_error() || ty.is_error() {
            return expr;
        }
        if matching(expr.ty, ty) {
            return expr;
        }
        let compatible = if explicit {
            cast_compatible(ty, expr.ty)
        } else {
            assignment_compatible(ty, expr.ty)
        };
        if !compatible {
            self.cx.diag.emit(
                DiagBuilder2::error(format!(
                    "no implicit conversion from `{}` to `{}`",
                    expr.ty, ty
                ))
                .code(DiagCode::NoImplicitConversion)
                .span(expr.span),
            );
            return self.bad(expr.span);
        }
        let kind = conversion_kind(expr.ty, ty);
        let span = expr.span;
        Expr::new(
            ty,
            span,
            ExprKind::Conversion {
                kind,
                operand: Box::new(expr),
            },
        )
    }

    /// The conversion an assignment performs: widen to the common type of
    /// both sides first, then truncate down to the target if it is
    /// narrower.
    pub fn convert_assignment(&self, expr: Expr<'t>, ty: Type<'t>) -> Expr<'t> {
        if expr.ty.is_error() || ty.is_error() {
            return expr;
        }
        if expr.ty.is_integral() && ty.is_integral() && expr.ty.width() > ty.width() {
            // Truncating assignment: a single truncation node does the job,
            // since the value is already wider than the target.
            return self.convert(expr, ty, false);
        }
        if expr.ty.is_integral() && ty.is_integral() && expr.ty.width() < ty.width() {
            let widened = self.cx.binary_arith_type(expr.ty, ty, false);
            let expr = self.convert(expr, widened, false);
            return self.convert(expr, ty, false);
        }
        self.convert(expr, ty, false)
    }
}

fn is_lvalue(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::NamedValue(_) => true,
        ExprKind::ElementSelect { value, .. } => is_lvalue(value),
        ExprKind::RangeSelect { value, .. } => is_lvalue(value),
        ExprKind::MemberAccess { value, .. } => is_lvalue(value),
        ExprKind::Concat { exprs, .. } => exprs.iter().all(is_lvalue),
        _ => false,
    }
}

fn strip_assign_op(op: Op) -> Op {
    match op {
        Op::AssignAdd => Op::Add,
        Op::AssignSub => Op::Sub,
        Op::AssignMul => Op::Mul,
        Op::AssignDiv => Op::Div,
        Op::AssignMod => Op::Mod,
        Op::AssignBitAnd => Op::BitAnd,
        Op::AssignBitOr => Op::BitOr,
        Op::AssignBitXor => Op::BitXor,
        Op::AssignLogicShL => Op::LogicShL,
        Op::AssignLogicShR => Op::LogicShR,
        Op::AssignArithShL => Op::ArithShL,
        Op::AssignArithShR => Op::ArithShR,
        other => other,
    }
}

/// Classify the conversion between two types.
fn conversion_kind<'t>(from: Type<'t>, to: Type<'t>) -> ConversionKind {
    if from.is_floating() && to.is_integral() {
        return ConversionKind::FloatToInt;
    }
    if from.is_integral() && to.is_floating() {
        return ConversionKind::IntToFloat;
    }
    if from.is_string() {
        return ConversionKind::StringToInt;
    }
    if from.is_integral() && to.is_integral() {
        if from.width() < to.width() {
            return ConversionKind::WidthExtend;
        }
        if from.width() > to.width() {
            return ConversionKind::Truncate;
        }
        return ConversionKind::SignChange;
    }
    ConversionKind::SignChange
}

// ----------------------------------------------------------------------
// Symbol types and type resolution
// ----------------------------------------------------------------------

impl<'t> Compilation<'t> {
    /// The type of a symbol, resolved and cached on first use.
    pub fn type_of_symbol(&self, id: SymbolId) -> Type<'t> {
        let sym = self.symbol(id);
        let scope = sym.parent.unwrap_or_else(|| self.root());
        match &sym.kind {
            SymbolKind::Variable(v) | SymbolKind::Net(v) => {
                if let Some(ty) = *v.ty.borrow() {
                    return ty;
                }
                let ty = self.resolve_type(&v.ty_ast, scope);
                *v.ty.borrow_mut() = Some(ty);
                ty
            }
            SymbolKind::Parameter(p) => {
                if let Some(ty) = *p.ty.borrow() {
                    return ty;
                }
                let ty = if p.ty_ast.data.kind == ast::TypeKind::ImplicitType
                    && p.ty_ast.data.dims.is_empty()
                {
                    // Untyped parameters take the type of their value.
                    match self.constant_value_of(id) {
                        Ok(value) => self.type_of_value(&value),
                        Err(_) => self.error_type(),
                    }
                } else {
                    self.resolve_type(&p.ty_ast, scope)
                };
                *p.ty.borrow_mut() = Some(ty);
                ty
            }
            SymbolKind::Typedef(td) => {
                if let Some(ty) = *td.ty.borrow() {
                    return ty;
                }
                let target = self.resolve_type(&td.ty_ast, scope);
                let ty = self.intern_type(TypeKind::Alias {
                    name: sym.name,
                    target,
                });
                *td.ty.borrow_mut() = Some(ty);
                ty
            }
            SymbolKind::EnumVariant(v) => {
                if let Some(ty) = *v.ty.borrow() {
                    return ty;
                }
                let ty = self.int_type();
                *v.ty.borrow_mut() = Some(ty);
                ty
            }
            SymbolKind::Genvar => self.int_type(),
            SymbolKind::Subroutine(decl) => match &decl.ret {
                Some(ty) => self.resolve_type(ty, scope),
                None => self.void_type(),
            },
            _ => self.void_type(),
        }
    }

    /// The self-determined type of a constant value.
    pub fn type_of_value(&self, value: &ConstantValue) -> Type<'t> {
        match value {
            ConstantValue::Int(v) => {
                if v.width() == 32 && v.is_signed() && !v.has_unknown() {
                    self.int_type()
                } else {
                    self.make_vector(v.width(), v.is_signed(), true)
                }
            }
            ConstantValue::Real(_) => self.real_type(),
            ConstantValue::Str(_) => self.string_type(),
            ConstantValue::Null => self.intern_type(TypeKind::Null),
            ConstantValue::Unbounded => self.int_type(),
            ConstantValue::Aggregate(_) => self.error_type(),
        }
    }

    /// Resolve a syntax-level type to an interned type, evaluating packed
    /// dimensions in the given scope.
    pub fn resolve_type(&self, ast_ty: &ast::Type, scope: SymbolId) -> Type<'t> {
        let signed_default = |default: bool| match ast_ty.data.sign {
            ast::TypeSign::Signed => true,
            ast::TypeSign::Unsigned => false,
            ast::TypeSign::None => default,
        };
        let base = match &ast_ty.data.kind {
            ast::TypeKind::ImplicitType => self.intern_type(TypeKind::Scalar {
                kind: ScalarKind::Logic,
                signed: signed_default(false),
            }),
            ast::TypeKind::VoidType => self.void_type(),
            ast::TypeKind::BitType => self.intern_type(TypeKind::Scalar {
                kind: ScalarKind::Bit,
                signed: signed_default(false),
            }),
            ast::TypeKind::LogicType => self.intern_type(TypeKind::Scalar {
                kind: ScalarKind::Logic,
                signed: signed_default(false),
            }),
            ast::TypeKind::RegType => self.intern_type(TypeKind::Scalar {
                kind: ScalarKind::Reg,
                signed: signed_default(false),
            }),
            ast::TypeKind::ByteType => self.predef(PredefInt::Byte, &ast_ty.data.sign),
            ast::TypeKind::ShortIntType => self.predef(PredefInt::ShortInt, &ast_ty.data.sign),
            ast::TypeKind::IntType => self.predef(PredefInt::Int, &ast_ty.data.sign),
            ast::TypeKind::LongIntType => self.predef(PredefInt::LongInt, &ast_ty.data.sign),
            ast::TypeKind::IntegerType => self.predef(PredefInt::Integer, &ast_ty.data.sign),
            ast::TypeKind::TimeType => self.predef(PredefInt::Time, &ast_ty.data.sign),
            ast::TypeKind::RealType => self.intern_type(TypeKind::Floating(FloatingKind::Real)),
            ast::TypeKind::ShortRealType => {
                self.intern_type(TypeKind::Floating(FloatingKind::ShortReal))
            }
            ast::TypeKind::RealtimeType => {
                self.intern_type(TypeKind::Floating(FloatingKind::RealTime))
            }
            ast::TypeKind::StringType => self.string_type(),
            ast::TypeKind::ChandleType => self.intern_type(TypeKind::CHandle),
            ast::TypeKind::EventType => self.intern_type(TypeKind::Event),
            ast::TypeKind::NamedType(ident) => {
                match self.lookup_name(scope, ident.name, ident.span, LookupFlags::TYPE) {
                    Some(found) => match &self.symbol(found).kind {
                        SymbolKind::Typedef(_) => self.type_of_symbol(found),
                        _ => {
                            self.diag.emit(
                                DiagBuilder2::error(format!(
                                    "`{}` is not a type",
                                    ident.name
                                ))
                                .code(DiagCode::NotAType)
                                .span(ident.span),
                            );
                            self.error_type()
                        }
                    },
                    None => {
                        self.diag.emit(
                            DiagBuilder2::error(format!("unknown type `{}`", ident.name))
                                .code(DiagCode::UnknownName)
                                .span(ident.span),
                        );
                        self.error_type()
                    }
                }
            }
            ast::TypeKind::ScopedType { pkg, name } => {
                match self.package_member(pkg.name, name.name) {
                    Some(found) => match &self.symbol(found).kind {
                        SymbolKind::Typedef(_) => self.type_of_symbol(found),
                        _ => {
                            self.diag.emit(
                                DiagBuilder2::error(format!(
                                    "`{}::{}` is not a type",
                                    pkg.name, name.name
                                ))
                                .code(DiagCode::NotAType)
                                .span(name.span),
                            );
                            self.error_type()
                        }
                    },
                    None => {
                        self.diag.emit(
                            DiagBuilder2::error(format!(
                                "unknown type `{}::{}`",
                                pkg.name, name.name
                            ))
                            .code(DiagCode::UnknownName)
                            .span(name.span),
                        );
                        self.error_type()
                    }
                }
            }
            ast::TypeKind::StructType {
                kind,
                packed,
                members,
            } => {
                let mut fields = Vec::new();
                for member in members {
                    let fty = self.resolve_type(&member.ty, scope);
                    for decl in &member.decls {
                        fields.push(StructField {
                            name: decl.name.name,
                            ty: fty,
                        });
                    }
                }
                self.intern_type(TypeKind::Struct(StructType {
                    kind: match kind {
                        ast::StructKind::Struct => StructKind::Struct,
                        ast::StructKind::Union => StructKind::Union,
                    },
                    packed: *packed,
                    fields,
                }))
            }
            ast::TypeKind::EnumType { base, variants } => {
                let base_ty = match base {
                    Some(b) => self.resolve_type(b, scope),
                    None => self.int_type(),
                };
                let width = base_ty.width().max(1);
                let binder = Binder::new(self, scope);
                let mut values = Vec::new();
                let mut next = SVInt::from_u64(width, base_ty.is_signed(), 0);
                for variant in variants {
                    let value = match &variant.value {
                        Some(init) => {
                            let bound = binder.bind(init);
                            match self.eval_const(&bound) {
                                Ok(ConstantValue::Int(v)) => {
                                    v.resize(width).as_signedness(base_ty.is_signed())
                                }
                                _ => next.clone(),
                            }
                        }
                        None => next.clone(),
                    };
                    next = value.add(&SVInt::from_u64(width, value.is_signed(), 1));
                    values.push((variant.name.name, value));
                }
                self.intern_type(TypeKind::Enum(EnumType {
                    base: base_ty,
                    variants: values,
                }))
            }
        };

        // Fold the packed dimensions around the base type, innermost first.
        let mut ty = base;
        for dim in ast_ty.data.dims.iter().rev() {
            let range = match dim {
                ast::TypeDim::Range(msb, lsb) => {
                    let binder = Binder::new(self, scope);
                    let msb_bound = binder.bind(msb);
                    let lsb_bound = binder.bind(lsb);
                    let msb = self.eval_to_i32(&msb_bound, DiagCode::ExpressionNotConstant);
                    let lsb = self.eval_to_i32(&lsb_bound, DiagCode::ExpressionNotConstant);
                    match (msb, lsb) {
                        (Some(msb), Some(lsb)) => Range { msb, lsb },
                        _ => return self.error_type(),
                    }
                }
                ast::TypeDim::Expr(size) => {
                    let binder = Binder::new(self, scope);
                    let bound = binder.bind(size);
                    match self.eval_to_u32(&bound, DiagCode::ValueMustBePositive) {
                        Some(size) if size >= 1 => Range {
                            msb: size as i32 - 1,
                            lsb: 0,
                        },
                        _ => return self.error_type(),
                    }
                }
                ast::TypeDim::Unsized | ast::TypeDim::Queue => {
                    self.diag.emit(
                        DiagBuilder2::error("this dimension is not allowed on a packed type")
                            .code(DiagCode::ExpectedType)
                            .span(ast_ty.span),
                    );
                    return self.error_type();
                }
            };
            ty = self.intern_type(TypeKind::PackedArray { elem: ty, range });
        }
        ty
    }

    fn predef(&self, kind: PredefInt, sign: &ast::TypeSign) -> Type<'t> {
        let signed = match sign {
            ast::TypeSign::Signed => true,
            ast::TypeSign::Unsigned => false,
            ast::TypeSign::None => kind.default_signed(),
        };
        self.intern_type(TypeKind::PredefInt { kind, signed })
    }

    // ------------------------------------------------------------------
    // Constant evaluation entry points
    // ------------------------------------------------------------------

    /// Evaluate a bound expression as a constant, attaching the
    /// interpreter's notes under one `ExpressionNotConstant` diagnostic on
    /// failure.
    pub fn eval_const(&self, expr: &Expr<'t>) -> Result<ConstantValue, ()> {
        let mut ctx = EvalContext::new(self);
        match ctx.eval(expr) {
            Ok(v) => Ok(v),
            Err(_) => {
                if !expr.ty.is_error() {
                    let mut diag = DiagBuilder2::error("expression is not a constant")
                        .code(DiagCode::ExpressionNotConstant)
                        .span(expr.span);
                    for note in ctx.notes {
                        diag = diag.add_note(note);
                    }
                    self.diag.emit(diag);
                }
                Err(())
            }
        }
    }

    /// Evaluate a bound expression to an `i32`, complaining with `code` if
    /// it is unknown or out of range.
    pub fn eval_to_i32(&self, expr: &Expr<'t>, code: DiagCode) -> Option<i32> {
        match self.eval_const(expr) {
            Ok(ConstantValue::Int(v)) => match v.to_i32() {
                Some(v) => Some(v),
                None => {
                    self.diag.emit(
                        DiagBuilder2::error(format!("`{}` cannot be used here", v))
                            .code(code)
                            .span(expr.span),
                    );
                    None
                }
            },
            Ok(_) => {
                self.diag.emit(
                    DiagBuilder2::error("expected an integral constant")
                        .code(code)
                        .span(expr.span),
                );
                None
            }
            Err(_) => None,
        }
    }

    pub fn eval_to_u32(&self, expr: &Expr<'t>, code: DiagCode) -> Option<u32> {
        match self.eval_const(expr) {
            Ok(ConstantValue::Int(v)) => match v.to_u32() {
                Some(v) => Some(v),
                None => {
                    self.diag.emit(
                        DiagBuilder2::error(format!("`{}` cannot be used here", v))
                            .code(code)
                            .span(expr.span),
                    );
                    None
                }
            },
            Ok(_) => {
                self.diag.emit(
                    DiagBuilder2::error("expected an integral constant")
                        .code(code)
                        .span(expr.span),
                );
                None
            }
            Err(_) => None,
        }
    }

    /// The constant value of a symbol: parameters and enum variants have
    /// one, everything else does not.
    pub fn constant_value_of(&self, id: SymbolId) -> Result<ConstantValue, ()> {
        let sym = self.symbol(id);
        match &sym.kind {
            SymbolKind::Parameter(p) => {
                if let Some(cached) = p.value.borrow().clone() {
                    return cached;
                }
                if p.evaluating.get() {
                    self.diag.emit(
                        DiagBuilder2::error(format!(
                            "parameter `{}` depends on its own value",
                            sym.name
                        ))
                        .code(DiagCode::ExpressionNotConstant)
                        .span(sym.span),
                    );
                    *p.value.borrow_mut() = Some(Err(()));
                    return Err(());
                }
                p.evaluating.set(true);
                let scope = sym.parent.unwrap_or_else(|| self.root());
                let result = match &p.init {
                    Some(init) => {
                        let binder = Binder::new(self, scope);
                        let bound = if p.ty_ast.data.kind == ast::TypeKind::ImplicitType
                            && p.ty_ast.data.dims.is_empty()
                        {
                            binder.bind(init)
                        } else {
                            let ty = self.resolve_type(&p.ty_ast, scope);
                            binder.bind_with_type(init, ty)
                        };
                        self.eval_const(&bound)
                    }
                    None => {
                        self.diag.emit(
                            DiagBuilder2::error(format!(
                                "parameter `{}` is not assigned and has no default",
                                sym.name
                            ))
                            .code(DiagCode::ExpressionNotConstant)
                            .span(sym.span),
                        );
                        Err(())
                    }
                };
                p.evaluating.set(false);
                *p.value.borrow_mut() = Some(result.clone());
                result
            }
            SymbolKind::EnumVariant(v) => {
                if let Some(cached) = v.value.borrow().clone() {
                    return cached;
                }
                let scope = sym.parent.unwrap_or_else(|| self.root());
                let result = match (&v.init, v.prev) {
                    (Some(init), _) => {
                        let binder = Binder::new(self, scope);
                        let bound = binder.bind(init);
                        self.eval_const(&bound)
                    }
                    // An unvalued variant is its predecessor plus one; the
                    // first one starts at zero.
                    (None, Some(prev)) => match self.constant_value_of(prev) {
                        Ok(ConstantValue::Int(p)) => {
                            let one = SVInt::from_u64(p.width(), p.is_signed(), 1);
                            Ok(ConstantValue::Int(p.add(&one)))
                        }
                        other => other,
                    },
                    (None, None) => Ok(ConstantValue::Int(SVInt::from_u64(32, true, 0))),
                };
                *v.value.borrow_mut() = Some(result.clone());
                result
            }
            _ => {
                self.diag.emit(
                    DiagBuilder2::error(format!("`{}` has no constant value", sym.name))
                        .code(DiagCode::ExpressionNotConstant)
                        .span(sym.span),
                );
                Err(())
            }
        }
    }
}
