// Copyright (c) 2024-2026 The shannon developers

//! The constant evaluator: an interpreter over bound expressions.
//!
//! Evaluation happens in an [`EvalContext`] that carries a stack of local
//! scopes (for constant function calls) and collects the notes explaining
//! why an evaluation failed. The caller attaches those notes under a single
//! `ExpressionNotConstant` diagnostic, so the user sees one error with its
//! full cause chain rather than a cascade.

use crate::binder::{Binder, BinaryOp, ConversionKind, Expr, ExprKind, SystemArg, UnaryOp};
use crate::compilation::{Compilation, SystemFunc};
use crate::symbols::*;
use num::{BigInt, FromPrimitive, One, ToPrimitive};
use shannon_common::name::get_name_table;
use shannon_common::svint::{Logic, SVInt};
use shannon_syntax::ast;
use std::collections::HashMap;
use std::fmt;

/// A value computed at elaboration time.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    /// A 4-state integer.
    Int(SVInt),
    Real(f64),
    Str(String),
    Null,
    /// The unbounded literal `$`.
    Unbounded,
    /// An aggregate with ordered elements.
    Aggregate(Vec<ConstantValue>),
}

impl ConstantValue {
    pub fn int(&self) -> Option<&SVInt> {
        match self {
            ConstantValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The truth value, following the reduction-OR convention.
    pub fn to_logic(&self) -> Logic {
        match self {
            ConstantValue::Int(v) => v.to_logic(),
            ConstantValue::Real(v) => Logic::from_bool(*v != 0.0),
            ConstantValue::Str(s) => Logic::from_bool(!s.is_empty()),
            ConstantValue::Null => Logic::Zero,
            ConstantValue::Unbounded => Logic::One,
            ConstantValue::Aggregate(_) => Logic::One,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConstantValue::Int(v) => write!(f, "{}", v),
            ConstantValue::Real(v) => write!(f, "{}", v),
            ConstantValue::Str(s) => write!(f, "\"{}\"", s),
            ConstantValue::Null => write!(f, "null"),
            ConstantValue::Unbounded => write!(f, "$"),
            ConstantValue::Aggregate(elems) => {
                write!(f, "'{{")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// How a statement in a constant function completed.
enum Flow {
    Normal,
    Return(Option<ConstantValue>),
    Break,
    Continue,
}

const MAX_EVAL_STEPS: usize = 1_000_000;
const MAX_CALL_DEPTH: usize = 64;

/// The state of one constant evaluation.
pub struct EvalContext<'a, 't> {
    cx: &'a Compilation<'t>,
    /// Local frames for constant function calls, innermost last.
    frames: Vec<HashMap<SymbolId, ConstantValue>>,
    /// Explanations collected on failure, attached as notes by the caller.
    pub notes: Vec<String>,
    steps: usize,
}

impl<'a, 't> EvalContext<'a, 't> {
    pub fn new(cx: &'a Compilation<'t>) -> EvalContext<'a, 't> {
        EvalContext {
            cx,
            frames: Vec::new(),
            notes: Vec::new(),
            steps: 0,
        }
    }

    fn note(&mut self, msg: impl Into<String>) -> Result<ConstantValue, ()> {
        self.notes.push(msg.into());
        Err(())
    }

    fn step(&mut self) -> Result<(), ()> {
        self.steps += 1;
        if self.steps > MAX_EVAL_STEPS {
            self.notes
                .push("constant evaluation did not terminate".to_string());
            return Err(());
        }
        Ok(())
    }

    fn frame_value(&self, id: SymbolId) -> Option<ConstantValue> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(&id).cloned())
    }

    fn frame_assign(&mut self, id: SymbolId, value: ConstantValue) -> bool {
        for frame in self.frames.iter_mut().rev() {
            if frame.contains_key(&id) {
                frame.insert(id, value);
                return true;
            }
        }
        false
    }

    /// Evaluate a bound expression to a constant value.
    pub fn eval(&mut self, expr: &Expr<'t>) -> Result<ConstantValue, ()> {
        self.step()?;
        match &expr.kind {
            ExprKind::Literal(v) => Ok(v.clone()),
            ExprKind::NamedValue(id) => self.eval_named(*id),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            ExprKind::Ternary {
                cond,
                true_expr,
                false_expr,
            } => {
                let cond = self.eval(cond)?;
                match cond.to_logic() {
                    Logic::One => self.eval(true_expr),
                    Logic::Zero => self.eval(false_expr),
                    // An unknown selector merges the two alternatives
                    // bitwise.
                    _ => {
                        let t = self.eval(true_expr)?;
                        let f = self.eval(false_expr)?;
                        match (t, f) {
                            (ConstantValue::Int(a), ConstantValue::Int(b)) => {
                                Ok(ConstantValue::Int(a.merge_conditional(&b)))
                            }
                            _ => self.note("conditional with unknown selector"),
                        }
                    }
                }
            }
            ExprKind::ElementSelect { value, index } => {
                let elem_width = expr.ty.width().max(1);
                let base_ty = value.ty;
                let value = self.eval(value)?;
                let index = self.eval(index)?;
                let (value, index) = match (value, index) {
                    (ConstantValue::Int(v), ConstantValue::Int(i)) => (v, i),
                    _ => return self.note("element select on a non-integral value"),
                };
                let index = match index.to_i32() {
                    Some(i) => i,
                    None => return Ok(ConstantValue::Int(SVInt::all_x(elem_width, false))),
                };
                let low = base_ty.get_range().map(|r| r.low()).unwrap_or(0);
                if index < low {
                    return Ok(ConstantValue::Int(SVInt::all_x(elem_width, false)));
                }
                let offset = (index - low) as u32 * elem_width;
                Ok(ConstantValue::Int(value.extract(offset, elem_width)))
            }
            ExprKind::RangeSelect { value, lsb, width } => {
                let value = self.eval(value)?;
                match value {
                    ConstantValue::Int(v) => Ok(ConstantValue::Int(v.extract(*lsb, *width))),
                    _ => self.note("part select on a non-integral value"),
                }
            }
            ExprKind::MemberAccess { value, field } => {
                let struct_ty = value.ty;
                let value = self.eval(value)?;
                match value {
                    ConstantValue::Aggregate(elems) => match elems.get(*field) {
                        Some(v) => Ok(v.clone()),
                        None => self.note("aggregate has too few elements"),
                    },
                    ConstantValue::Int(v) => {
                        // Packed struct: the first field sits in the most
                        // significant bits.
                        let fields = match struct_ty.struct_fields() {
                            Some(fields) => fields,
                            None => return self.note("member access on a non-struct value"),
                        };
                        let width = fields[*field].ty.width();
                        let lsb: u32 = fields[*field + 1..].iter().map(|f| f.ty.width()).sum();
                        Ok(ConstantValue::Int(v.extract(lsb, width)))
                    }
                    _ => self.note("member access on a non-struct value"),
                }
            }
            ExprKind::Concat { repeat, exprs } => {
                let mut parts = Vec::new();
                for e in exprs {
                    match self.eval(e)? {
                        ConstantValue::Int(v) => parts.push(v),
                        _ => return self.note("concatenation of a non-integral value"),
                    }
                }
                let whole = SVInt::concat(parts.iter());
                let whole = if *repeat > 1 {
                    whole.replicate(*repeat)
                } else {
                    whole
                };
                Ok(ConstantValue::Int(whole))
            }
            ExprKind::Inside { value, ranges } => self.eval_inside(value, ranges),
            ExprKind::SystemCall { func, arg } => self.eval_system_call(*func, arg),
            ExprKind::UserCall { subroutine, args } => {
                let mut values = Vec::new();
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.eval_user_call(*subroutine, values)
            }
            ExprKind::Conversion { kind, operand } => {
                let value = self.eval(operand)?;
                self.apply_conversion(*kind, value, expr)
            }
            ExprKind::Assignment { lhs, rhs } => {
                let value = self.eval(rhs)?;
                self.assign_into(lhs, value.clone())?;
                Ok(value)
            }
            ExprKind::Aggregate(exprs) => {
                let mut elems = Vec::new();
                for e in exprs {
                    elems.push(self.eval(e)?);
                }
                Ok(ConstantValue::Aggregate(elems))
            }
            ExprKind::Bad => Err(()),
        }
    }

    fn eval_named(&mut self, id: SymbolId) -> Result<ConstantValue, ()> {
        if let Some(v) = self.frame_value(id) {
            return Ok(v);
        }
        let sym = self.cx.symbol(id);
        match &sym.kind {
            SymbolKind::Parameter(_) | SymbolKind::EnumVariant(_) => {
                match self.cx.constant_value_of(id) {
                    Ok(v) => Ok(v),
                    Err(_) => self.note(format!("failed to evaluate `{}`", sym.name)),
                }
            }
            SymbolKind::Genvar => self.note(format!(
                "genvar `{}` has no value outside generate elaboration",
                sym.name
            )),
            _ => self.note(format!("`{}` does not have a constant value", sym.name)),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr<'t>) -> Result<ConstantValue, ()> {
        // Increments mutate local frames and are only meaningful inside
        // constant functions.
        if let UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec = op {
            return self.eval_incdec(op, operand);
        }
        let value = self.eval(operand)?;
        match value {
            ConstantValue::Int(v) => {
                let result = match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Minus => v.neg(),
                    UnaryOp::BitNot => v.bit_not(),
                    UnaryOp::LogicNot => logic_bit(match v.to_logic() {
                        Logic::Zero => Logic::One,
                        Logic::One => Logic::Zero,
                        x => x,
                    }),
                    UnaryOp::RedAnd => logic_bit(v.reduce_and()),
                    UnaryOp::RedNand => logic_bit(invert(v.reduce_and())),
                    UnaryOp::RedOr => logic_bit(v.reduce_or()),
                    UnaryOp::RedNor => logic_bit(invert(v.reduce_or())),
                    UnaryOp::RedXor => logic_bit(v.reduce_xor()),
                    UnaryOp::RedXnor => logic_bit(invert(v.reduce_xor())),
                    _ => unreachable!(),
                };
                Ok(ConstantValue::Int(result))
            }
            ConstantValue::Real(v) => match op {
                UnaryOp::Plus => Ok(ConstantValue::Real(v)),
                UnaryOp::Minus => Ok(ConstantValue::Real(-v)),
                UnaryOp::LogicNot => Ok(ConstantValue::Int(logic_bit(Logic::from_bool(
                    v == 0.0,
                )))),
                _ => self.note("operator cannot be applied to a real value"),
            },
            _ => self.note("operator cannot be applied to this value"),
        }
    }

    fn eval_incdec(&mut self, op: UnaryOp, operand: &Expr<'t>) -> Result<ConstantValue, ()> {
        let id = match &operand.kind {
            ExprKind::NamedValue(id) => *id,
            _ => return self.note("increment target must be a simple variable"),
        };
        let current = match self.frame_value(id) {
            Some(ConstantValue::Int(v)) => v,
            _ => return self.note("increment target is not a local constant variable"),
        };
        let one = SVInt::from_u64(current.width(), current.is_signed(), 1);
        let updated = match op {
            UnaryOp::PreInc | UnaryOp::PostInc => current.add(&one),
            _ => current.sub(&one),
        };
        self.frame_assign(id, ConstantValue::Int(updated.clone()));
        let result = match op {
            UnaryOp::PreInc | UnaryOp::PreDec => updated,
            _ => current,
        };
        Ok(ConstantValue::Int(result))
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr<'t>,
        rhs: &Expr<'t>,
    ) -> Result<ConstantValue, ()> {
        // The logical operators get short-circuit treatment with proper
        // 4-state semantics.
        match op {
            BinaryOp::LogicAnd | BinaryOp::LogicOr | BinaryOp::LogicImpl | BinaryOp::LogicEquiv => {
                let a = self.eval(lhs)?.to_logic();
                let b = self.eval(rhs)?.to_logic();
                let result = match op {
                    BinaryOp::LogicAnd => logic_and(a, b),
                    BinaryOp::LogicOr => logic_or(a, b),
                    BinaryOp::LogicImpl => logic_or(invert_logic_value(a), b),
                    BinaryOp::LogicEquiv => {
                        logic_or(logic_and(a, b), logic_and(invert_logic_value(a), invert_logic_value(b)))
                    }
                    _ => unreachable!(),
                };
                return Ok(ConstantValue::Int(logic_bit(result)));
            }
            _ => (),
        }

        let l = self.eval(lhs)?;
        let r = self.eval(rhs)?;
        match (l, r) {
            (ConstantValue::Int(a), ConstantValue::Int(b)) => {
                let result = match op {
                    BinaryOp::Add => a.add(&b),
                    BinaryOp::Sub => a.sub(&b),
                    BinaryOp::Mul => a.mul(&b),
                    BinaryOp::Div => a.div(&b),
                    BinaryOp::Mod => a.rem(&b),
                    BinaryOp::Pow => a.pow(&b),
                    BinaryOp::Shl => a.shl(&b),
                    BinaryOp::LShr => a.lshr(&b),
                    BinaryOp::AShr => a.ashr(&b),
                    BinaryOp::Lt => logic_bit(a.lt(&b)),
                    BinaryOp::Le => logic_bit(a.le(&b)),
                    BinaryOp::Gt => logic_bit(a.gt(&b)),
                    BinaryOp::Ge => logic_bit(a.ge(&b)),
                    BinaryOp::Eq => logic_bit(a.logic_eq(&b)),
                    BinaryOp::Neq => logic_bit(a.logic_neq(&b)),
                    BinaryOp::CaseEq => logic_bit(Logic::from_bool(a.case_eq(&b))),
                    BinaryOp::CaseNeq => logic_bit(Logic::from_bool(!a.case_eq(&b))),
                    BinaryOp::WildcardEq => logic_bit(a.wildcard_eq(&b)),
                    BinaryOp::WildcardNeq => logic_bit(invert(a.wildcard_eq(&b))),
                    BinaryOp::BitAnd => a.bit_and(&b),
                    BinaryOp::BitOr => a.bit_or(&b),
                    BinaryOp::BitXor => a.bit_xor(&b),
                    BinaryOp::BitXnor => a.bit_xor(&b).bit_not(),
                    _ => unreachable!(),
                };
                Ok(ConstantValue::Int(result))
            }
            (l, r) => {
                // Mixed or floating arithmetic; integers promote to real.
                let a = match to_real(&l) {
                    Some(a) => a,
                    None => return self.note("operands are not numeric constants"),
                };
                let b = match to_real(&r) {
                    Some(b) => b,
                    None => return self.note("operands are not numeric constants"),
                };
                let result = match op {
                    BinaryOp::Add => ConstantValue::Real(a + b),
                    BinaryOp::Sub => ConstantValue::Real(a - b),
                    BinaryOp::Mul => ConstantValue::Real(a * b),
                    BinaryOp::Div => ConstantValue::Real(a / b),
                    BinaryOp::Mod => ConstantValue::Real(a % b),
                    BinaryOp::Pow => ConstantValue::Real(a.powf(b)),
                    BinaryOp::Lt => bool_bit(a < b),
                    BinaryOp::Le => bool_bit(a <= b),
                    BinaryOp::Gt => bool_bit(a > b),
                    BinaryOp::Ge => bool_bit(a >= b),
                    BinaryOp::Eq | BinaryOp::CaseEq => bool_bit(a == b),
                    BinaryOp::Neq | BinaryOp::CaseNeq => bool_bit(a != b),
                    _ => return self.note("operator cannot be applied to real values"),
                };
                Ok(result)
            }
        }
    }

    fn eval_inside(
        &mut self,
        value: &Expr<'t>,
        ranges: &[(Expr<'t>, Option<Expr<'t>>)],
    ) -> Result<ConstantValue, ()> {
        let v = match self.eval(value)? {
            ConstantValue::Int(v) => v,
            _ => return self.note("`inside` needs an integral value"),
        };
        let mut saw_unknown = false;
        for (first, second) in ranges {
            let a = match self.eval(first)? {
                ConstantValue::Int(a) => a,
                _ => return self.note("`inside` range is not integral"),
            };
            let hit = match second {
                None => v.wildcard_eq(&a),
                Some(hi) => {
                    let b = match self.eval(hi)? {
                        ConstantValue::Int(b) => b,
                        _ => return self.note("`inside` range is not integral"),
                    };
                    logic_and(a.le(&v), v.le(&b))
                }
            };
            match hit {
                Logic::One => return Ok(ConstantValue::Int(logic_bit(Logic::One))),
                Logic::Zero => (),
                _ => saw_unknown = true,
            }
        }
        let result = if saw_unknown { Logic::X } else { Logic::Zero };
        Ok(ConstantValue::Int(logic_bit(result)))
    }

    fn eval_system_call(
        &mut self,
        func: SystemFunc,
        arg: &SystemArg<'t>,
    ) -> Result<ConstantValue, ()> {
        let int32 = |v: i64| ConstantValue::Int(SVInt::new(32, true, v.into()));

        if func == SystemFunc::Clog2 {
            let value = match arg {
                SystemArg::Expr(e) => self.eval(e)?,
                SystemArg::Type(_) => return self.note("$clog2 needs a value argument"),
            };
            let v = match value.int() {
                Some(v) => v,
                None => return self.note("$clog2 needs an integral argument"),
            };
            let v = match v.get_value() {
                Some(v) => v,
                None => return self.note("$clog2 argument must not contain X or Z bits"),
            };
            if v < BigInt::from(0) {
                return self.note("$clog2 argument must not be negative");
            }
            let result = if v <= BigInt::one() {
                0
            } else {
                (v - BigInt::one()).bits() as i64
            };
            return Ok(int32(result));
        }

        // The remaining functions introspect the type of their argument.
        let ty = match arg {
            SystemArg::Type(ty) => *ty,
            SystemArg::Expr(e) => e.ty,
        };
        if func == SystemFunc::Bits {
            let width = ty.width();
            if width == 0 {
                return self.note(format!("`{}` has no bit width", ty));
            }
            return Ok(int32(width as i64));
        }
        let range = match ty.get_range() {
            Some(range) => range,
            None => return self.note(format!("`{}` has no packed dimension", ty)),
        };
        let result = match func {
            SystemFunc::Left => range.left() as i64,
            SystemFunc::Right => range.right() as i64,
            SystemFunc::Low => range.low() as i64,
            SystemFunc::High => range.high() as i64,
            SystemFunc::Size => range.width() as i64,
            SystemFunc::Increment => range.increment() as i64,
            SystemFunc::Clog2 | SystemFunc::Bits => unreachable!(),
        };
        Ok(int32(result))
    }

    fn apply_conversion(
        &mut self,
        kind: ConversionKind,
        value: ConstantValue,
        expr: &Expr<'t>,
    ) -> Result<ConstantValue, ()> {
        let target = expr.ty;
        match kind {
            ConversionKind::WidthExtend
            | ConversionKind::Truncate
            | ConversionKind::SignChange => match value {
                ConstantValue::Int(v) => {
                    let resized = v.resize(target.width().max(1));
                    Ok(ConstantValue::Int(resized.as_signedness(target.is_signed())))
                }
                other => Ok(other),
            },
            ConversionKind::IntToFloat => match value {
                ConstantValue::Int(v) => {
                    let f = v
                        .get_value()
                        .as_ref()
                        .and_then(BigInt::to_f64)
                        .unwrap_or(0.0);
                    Ok(ConstantValue::Real(f))
                }
                other => Ok(other),
            },
            ConversionKind::FloatToInt => match value {
                ConstantValue::Real(f) => {
                    let rounded = f.round();
                    let big = BigInt::from_f64(rounded).unwrap_or_else(|| BigInt::from(0));
                    Ok(ConstantValue::Int(
                        SVInt::new(target.width().max(32), target.is_signed(), big),
                    ))
                }
                other => Ok(other),
            },
            ConversionKind::StringToInt => match value {
                ConstantValue::Str(s) => {
                    let width = (target.width().max(8)).max(s.len() as u32 * 8);
                    let mut big = BigInt::from(0);
                    for byte in s.bytes() {
                        big = (big << 8) | BigInt::from(byte);
                    }
                    let v = SVInt::new(width, false, big).resize(target.width().max(1));
                    Ok(ConstantValue::Int(v))
                }
                other => Ok(other),
            },
        }
    }

    fn assign_into(&mut self, lhs: &Expr<'t>, value: ConstantValue) -> Result<(), ()> {
        match &lhs.kind {
            ExprKind::NamedValue(id) => {
                if self.frame_assign(*id, value) {
                    Ok(())
                } else {
                    self.notes.push(format!(
                        "cannot assign to `{}` in a constant expression",
                        self.cx.symbol(*id).name
                    ));
                    Err(())
                }
            }
            _ => {
                self.notes
                    .push("assignment target is too complex for constant evaluation".to_string());
                Err(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Constant functions
    // ------------------------------------------------------------------

    /// Interpret a call to a user function. The function gets a fresh local
    /// frame holding its arguments, its implicit result variable, and any
    /// locals its body declares; the body statements execute over that
    /// frame.
    pub fn eval_user_call(
        &mut self,
        subroutine: SymbolId,
        args: Vec<ConstantValue>,
    ) -> Result<ConstantValue, ()> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return self.note("constant function calls are nested too deeply");
        }
        let sym = self.cx.symbol(subroutine);
        let decl = match &sym.kind {
            SymbolKind::Subroutine(decl) => decl.clone(),
            _ => return self.note(format!("`{}` is not a constant function", sym.name)),
        };
        if decl.kind != ast::SubroutineKind::Func {
            return self.note(format!("task `{}` cannot be evaluated as a constant", sym.name));
        }

        // Build a scope for the call holding the arguments and the
        // function-name result variable.
        let parent = sym.parent.unwrap_or_else(|| self.cx.root());
        let call_scope = self.cx.alloc_symbol(
            get_name_table().intern(""),
            sym.span,
            Some(parent),
            SymbolKind::GenerateBlock(Scope::new(Vec::new())),
        );
        let mut frame = HashMap::new();
        {
            let scope_sym = self.cx.symbol(call_scope);
            let scope = scope_of(&scope_sym).unwrap();
            scope.materialized.set(true);
            for (idx, arg) in decl.args.iter().enumerate() {
                let arg_sym = self.cx.alloc_symbol(
                    arg.name.name,
                    arg.name.span,
                    Some(call_scope),
                    SymbolKind::Variable(ValueSym {
                        ty: std::cell::RefCell::new(None),
                        ty_ast: arg.ty.clone(),
                        dims: Vec::new(),
                        init: None,
                    }),
                );
                self.cx.add_member(scope, arg_sym);
                let value = match args.get(idx) {
                    Some(v) => v.clone(),
                    None => match &arg.default {
                        Some(e) => {
                            let binder = Binder::new(self.cx, parent);
                            let bound = binder.bind(e);
                            self.eval(&bound)?
                        }
                        None => {
                            return self.note(format!(
                                "missing argument `{}` in call to `{}`",
                                arg.name.name, sym.name
                            ))
                        }
                    },
                };
                frame.insert(arg_sym, value);
            }
            // The function name doubles as its result variable.
            let ret_ty = decl
                .ret
                .clone()
                .unwrap_or_else(|| ast::Type::new(sym.span, ast::TypeData {
                    kind: ast::TypeKind::LogicType,
                    sign: ast::TypeSign::None,
                    dims: Vec::new(),
                }));
            let result_sym = self.cx.alloc_symbol(
                sym.name,
                sym.span,
                Some(call_scope),
                SymbolKind::Variable(ValueSym {
                    ty: std::cell::RefCell::new(None),
                    ty_ast: ret_ty,
                    dims: Vec::new(),
                    init: None,
                }),
            );
            self.cx.add_member(scope, result_sym);
            frame.insert(
                result_sym,
                ConstantValue::Int(SVInt::from_u64(32, true, 0)),
            );
        }

        self.frames.push(frame);
        let mut result = None;
        for stmt in &decl.stmts {
            match self.exec_stmt(call_scope, stmt) {
                Ok(Flow::Return(v)) => {
                    result = v;
                    break;
                }
                Ok(Flow::Normal) => (),
                Ok(Flow::Break) | Ok(Flow::Continue) => break,
                Err(_) => {
                    self.frames.pop();
                    self.notes
                        .push(format!("while evaluating a call to `{}`", sym.name));
                    return Err(());
                }
            }
        }
        // Fall back to the implicit result variable.
        let result = match result {
            Some(v) => v,
            None => {
                let scope_sym = self.cx.symbol(call_scope);
                let scope = scope_of(&scope_sym).unwrap();
                let result_sym = scope.names.borrow().get(&sym.name).copied();
                match result_sym.and_then(|id| self.frame_value(id)) {
                    Some(v) => v,
                    None => ConstantValue::Int(SVInt::from_u64(32, true, 0)),
                }
            }
        };
        self.frames.pop();
        Ok(result)
    }

    fn exec_stmt(&mut self, scope: SymbolId, stmt: &ast::Stmt) -> Result<Flow, ()> {
        self.step().map_err(|_| ())?;
        match &stmt.data {
            ast::StmtData::NullStmt => Ok(Flow::Normal),
            ast::StmtData::SequentialBlock { stmts, .. } => {
                for s in stmts {
                    match self.exec_stmt(scope, s)? {
                        Flow::Normal => (),
                        other => return Ok(other),
                    }
                }
                Ok(Flow::Normal)
            }
            ast::StmtData::VarDeclStmt(decl) => {
                let scope_sym = self.cx.symbol(scope);
                let sc = scope_of(&scope_sym).unwrap();
                for da in &decl.decls {
                    // A declaration re-executed in a loop reuses its symbol
                    // and just resets the value.
                    let existing = sc.names.borrow().get(&da.name.name).copied();
                    let var_sym = match existing {
                        Some(id) => id,
                        None => {
                            let id = self.cx.alloc_symbol(
                                da.name.name,
                                da.name.span,
                                Some(scope),
                                SymbolKind::Variable(ValueSym {
                                    ty: std::cell::RefCell::new(None),
                                    ty_ast: decl.ty.clone(),
                                    dims: da.dims.clone(),
                                    init: None,
                                }),
                            );
                            self.cx.add_member(sc, id);
                            id
                        }
                    };
                    let value = match &da.init {
                        Some(init) => {
                            let binder = Binder::new(self.cx, scope);
                            let ty = self.cx.type_of_symbol(var_sym);
                            let bound = binder.bind_with_type(init, ty);
                            self.eval(&bound)?
                        }
                        None => {
                            let ty = self.cx.type_of_symbol(var_sym);
                            ConstantValue::Int(SVInt::zero(ty.width().max(1)))
                        }
                    };
                    if let Some(frame) = self.frames.last_mut() {
                        frame.insert(var_sym, value);
                    }
                }
                Ok(Flow::Normal)
            }
            ast::StmtData::AssignStmt {
                lhs,
                op,
                rhs,
                nonblocking,
            } => {
                if *nonblocking {
                    self.notes
                        .push("nonblocking assignments have no constant value".to_string());
                    return Err(());
                }
                let binder = Binder::new(self.cx, scope);
                let bound_lhs = binder.bind(lhs);
                let value = match op {
                    None => {
                        let bound_rhs = binder.bind_with_type(rhs, bound_lhs.ty);
                        self.eval(&bound_rhs)?
                    }
                    Some(op) => {
                        let combined = ast::Expr::new(
                            stmt.span,
                            ast::ExprData::BinaryExpr {
                                op: strip_assign(*op),
                                lhs: lhs.clone(),
                                rhs: rhs.clone(),
                            },
                        );
                        let bound = binder.bind(&combined);
                        let bound = binder.convert_assignment(bound, bound_lhs.ty);
                        self.eval(&bound)?
                    }
                };
                self.assign_into(&bound_lhs, value)?;
                Ok(Flow::Normal)
            }
            ast::StmtData::IfStmt { cond, main, alt } => {
                let binder = Binder::new(self.cx, scope);
                let bound = binder.bind(cond);
                match self.eval(&bound)?.to_logic() {
                    Logic::One => self.exec_stmt(scope, main),
                    Logic::Zero => match alt {
                        Some(alt) => self.exec_stmt(scope, alt),
                        None => Ok(Flow::Normal),
                    },
                    _ => {
                        self.notes
                            .push("condition evaluates to an unknown value".to_string());
                        Err(())
                    }
                }
            }
            ast::StmtData::CaseStmt { expr, items, .. } => {
                let binder = Binder::new(self.cx, scope);
                let bound = binder.bind(expr);
                let selector = match self.eval(&bound)? {
                    ConstantValue::Int(v) => v,
                    _ => {
                        self.notes.push("case selector is not integral".to_string());
                        return Err(());
                    }
                };
                let mut default = None;
                for item in items {
                    if item.guards.is_empty() {
                        default = Some(&item.stmt);
                        continue;
                    }
                    for guard in &item.guards {
                        let bound = binder.bind(guard);
                        if let ConstantValue::Int(g) = self.eval(&bound)? {
                            if selector.case_eq(&g) {
                                return self.exec_stmt(scope, &item.stmt);
                            }
                        }
                    }
                }
                match default {
                    Some(stmt) => self.exec_stmt(scope, stmt),
                    None => Ok(Flow::Normal),
                }
            }
            ast::StmtData::ForStmt {
                init,
                cond,
                step,
                body,
            } => {
                self.exec_stmt(scope, init)?;
                loop {
                    let binder = Binder::new(self.cx, scope);
                    let bound = binder.bind(cond);
                    match self.eval(&bound)?.to_logic() {
                        Logic::One => (),
                        _ => break,
                    }
                    match self.exec_stmt(scope, body)? {
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Break => break,
                        _ => (),
                    }
                    for s in step {
                        self.exec_stmt(scope, s)?;
                    }
                    self.step().map_err(|_| ())?;
                }
                Ok(Flow::Normal)
            }
            ast::StmtData::WhileStmt { cond, body } => {
                loop {
                    let binder = Binder::new(self.cx, scope);
                    let bound = binder.bind(cond);
                    match self.eval(&bound)?.to_logic() {
                        Logic::One => (),
                        _ => break,
                    }
                    match self.exec_stmt(scope, body)? {
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Break => break,
                        _ => (),
                    }
                    self.step().map_err(|_| ())?;
                }
                Ok(Flow::Normal)
            }
            ast::StmtData::DoWhileStmt { body, cond } => {
                loop {
                    match self.exec_stmt(scope, body)? {
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Break => break,
                        _ => (),
                    }
                    let binder = Binder::new(self.cx, scope);
                    let bound = binder.bind(cond);
                    match self.eval(&bound)?.to_logic() {
                        Logic::One => (),
                        _ => break,
                    }
                    self.step().map_err(|_| ())?;
                }
                Ok(Flow::Normal)
            }
            ast::StmtData::RepeatStmt { count, body } => {
                let binder = Binder::new(self.cx, scope);
                let bound = binder.bind(count);
                let n = match self.eval(&bound)? {
                    ConstantValue::Int(v) => v.to_usize().unwrap_or(0),
                    _ => 0,
                };
                for _ in 0..n {
                    match self.exec_stmt(scope, body)? {
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Break => break,
                        _ => (),
                    }
                    self.step().map_err(|_| ())?;
                }
                Ok(Flow::Normal)
            }
            ast::StmtData::ReturnStmt(expr) => {
                let value = match expr {
                    Some(e) => {
                        let binder = Binder::new(self.cx, scope);
                        let bound = binder.bind(e);
                        Some(self.eval(&bound)?)
                    }
                    None => None,
                };
                Ok(Flow::Return(value))
            }
            ast::StmtData::BreakStmt => Ok(Flow::Break),
            ast::StmtData::ContinueStmt => Ok(Flow::Continue),
            ast::StmtData::ExprStmt(e) => {
                let binder = Binder::new(self.cx, scope);
                let bound = binder.bind(e);
                self.eval(&bound)?;
                Ok(Flow::Normal)
            }
            _ => {
                self.notes.push(
                    "this statement cannot be executed during constant evaluation".to_string(),
                );
                Err(())
            }
        }
    }
}

fn invert(l: Logic) -> Logic {
    match l {
        Logic::Zero => Logic::One,
        Logic::One => Logic::Zero,
        x => x,
    }
}

fn invert_logic_value(l: Logic) -> Logic {
    invert(l)
}

fn logic_and(a: Logic, b: Logic) -> Logic {
    match (a, b) {
        (Logic::Zero, _) | (_, Logic::Zero) => Logic::Zero,
        (Logic::One, Logic::One) => Logic::One,
        _ => Logic::X,
    }
}

fn logic_or(a: Logic, b: Logic) -> Logic {
    match (a, b) {
        (Logic::One, _) | (_, Logic::One) => Logic::One,
        (Logic::Zero, Logic::Zero) => Logic::Zero,
        _ => Logic::X,
    }
}

/// A single 4-state bit as a one-bit integer value.
fn logic_bit(l: Logic) -> SVInt {
    SVInt::filled(1, l)
}

fn bool_bit(b: bool) -> ConstantValue {
    ConstantValue::Int(logic_bit(Logic::from_bool(b)))
}

fn to_real(v: &ConstantValue) -> Option<f64> {
    match v {
        ConstantValue::Real(f) => Some(*f),
        ConstantValue::Int(v) => v.get_value().as_ref().and_then(BigInt::to_f64),
        _ => None,
    }
}

fn strip_assign(op: shannon_syntax::token::Op) -> shannon_syntax::token::Op {
    use shannon_syntax::token::Op;
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
