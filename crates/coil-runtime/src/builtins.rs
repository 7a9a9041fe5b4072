//! Builtin callables, resolved by name.
//!
//! The compiler encodes every operator and cast as a call to a fixed-name
//! callable: `<OP>_<TYPE>` for arithmetic, bitwise and comparison
//! operators, `<FROM>_TO_<TO>` for casts, `NOT_BOOL`, and the
//! `FOR_LOOP_INIT_<T>` / `FOR_LOOP_NEXT_<T>` pair driving `FOR` loops.
//! Names resolve case-insensitively. The IR itself is untyped, so this is
//! the one place that knows about signedness and floating point; integer
//! arithmetic wraps, and integer division or modulo by zero is a panic.

use coil_ir::IrType;

use crate::error::PanicReason;

/// Width and interpretation of one IEC elementary type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NumTy {
    pub bytes: u8,
    pub signed: bool,
    pub float: bool,
}

impl NumTy {
    fn parse(name: &str) -> Option<Self> {
        let ty = |bytes, signed, float| NumTy {
            bytes,
            signed,
            float,
        };
        const NAMES: [(&str, (u8, bool, bool)); 15] = [
            ("BOOL", (1, false, false)),
            ("SINT", (1, true, false)),
            ("INT", (2, true, false)),
            ("DINT", (4, true, false)),
            ("LINT", (8, true, false)),
            ("USINT", (1, false, false)),
            ("UINT", (2, false, false)),
            ("UDINT", (4, false, false)),
            ("ULINT", (8, false, false)),
            ("BYTE", (1, false, false)),
            ("WORD", (2, false, false)),
            ("DWORD", (4, false, false)),
            ("LWORD", (8, false, false)),
            ("REAL", (4, true, true)),
            ("LREAL", (8, true, true)),
        ];
        NAMES
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|&(_, (bytes, signed, float))| ty(bytes, signed, float))
    }

    pub(crate) fn ir_type(self) -> IrType {
        match self.bytes {
            1 => IrType::Byte,
            2 => IrType::Word,
            4 => IrType::DWord,
            _ => IrType::LWord,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One resolved builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    NotBool,
    Negate(NumTy),
    BitNot(NumTy),
    Binary { op: BinaryOp, ty: NumTy },
    Compare { op: CompareOp, ty: NumTy },
    Cast { from: NumTy, to: NumTy },
    ToBool { from: NumTy },
    ForInit(NumTy),
    ForNext(NumTy),
}

/// Resolves a callee name to a builtin, or `None` if the name matches no
/// builtin pattern.
pub(crate) fn resolve(name: &str) -> Option<Builtin> {
    if name.eq_ignore_ascii_case("NOT_BOOL") {
        return Some(Builtin::NotBool);
    }
    if let Some(rest) = strip_prefix_ci(name, "FOR_LOOP_INIT_") {
        let ty = NumTy::parse(rest)?;
        return (!ty.float).then_some(Builtin::ForInit(ty));
    }
    if let Some(rest) = strip_prefix_ci(name, "FOR_LOOP_NEXT_") {
        let ty = NumTy::parse(rest)?;
        return (!ty.float).then_some(Builtin::ForNext(ty));
    }
    if let Some((from, to)) = split_cast(name) {
        let from = NumTy::parse(from)?;
        if to.eq_ignore_ascii_case("BOOL") {
            return Some(Builtin::ToBool { from });
        }
        let to = NumTy::parse(to)?;
        return Some(Builtin::Cast { from, to });
    }
    let (op, ty_name) = name.split_once('_')?;
    let ty = NumTy::parse(ty_name)?;
    let binary = |op| Some(Builtin::Binary { op, ty });
    let compare = |op| Some(Builtin::Compare { op, ty });
    match op.to_ascii_uppercase().as_str() {
        "NEG" => Some(Builtin::Negate(ty)),
        "NOT" if !ty.float => Some(Builtin::BitNot(ty)),
        "ADD" => binary(BinaryOp::Add),
        "SUB" => binary(BinaryOp::Sub),
        "MUL" => binary(BinaryOp::Mul),
        "DIV" => binary(BinaryOp::Div),
        "MOD" if !ty.float => binary(BinaryOp::Mod),
        "AND" if !ty.float => binary(BinaryOp::And),
        "OR" if !ty.float => binary(BinaryOp::Or),
        "XOR" if !ty.float => binary(BinaryOp::Xor),
        "EQ" => compare(CompareOp::Eq),
        "NE" => compare(CompareOp::Ne),
        "LT" => compare(CompareOp::Lt),
        "LE" => compare(CompareOp::Le),
        "GT" => compare(CompareOp::Gt),
        "GE" => compare(CompareOp::Ge),
        _ => None,
    }
}

fn strip_prefix_ci<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    if name.len() >= prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&name[prefix.len()..])
    } else {
        None
    }
}

fn split_cast(name: &str) -> Option<(&str, &str)> {
    let upper = name.to_ascii_uppercase();
    let pos = upper.find("_TO_")?;
    Some((&name[..pos], &name[pos + 4..]))
}

impl Builtin {
    /// Widths of the input slots, in call order.
    pub(crate) fn input_types(self) -> Vec<IrType> {
        match self {
            Builtin::NotBool => vec![IrType::Byte],
            Builtin::Negate(ty) | Builtin::BitNot(ty) => vec![ty.ir_type()],
            Builtin::Binary { ty, .. } | Builtin::Compare { ty, .. } => {
                vec![ty.ir_type(); 2]
            }
            Builtin::Cast { from, .. } | Builtin::ToBool { from } => vec![from.ir_type()],
            Builtin::ForInit(ty) => vec![ty.ir_type(); 3],
            // Control-variable address, then step and end values.
            Builtin::ForNext(ty) => vec![IrType::POINTER, ty.ir_type(), ty.ir_type()],
        }
    }

    pub(crate) fn output_type(self) -> IrType {
        match self {
            Builtin::Negate(ty) | Builtin::BitNot(ty) | Builtin::Binary { ty, .. } => ty.ir_type(),
            Builtin::Cast { to, .. } => to.ir_type(),
            Builtin::NotBool
            | Builtin::Compare { .. }
            | Builtin::ToBool { .. }
            | Builtin::ForInit(_)
            | Builtin::ForNext(_) => IrType::Byte,
        }
    }

    /// Evaluates a builtin that only reads its input values. `ForNext` is
    /// the one exception; the interpreter handles it directly because it
    /// writes through the control-variable pointer.
    pub(crate) fn eval(self, inputs: &[u64]) -> Result<u64, PanicReason> {
        match self {
            Builtin::NotBool => Ok(u64::from(inputs[0] == 0)),
            Builtin::Negate(ty) => {
                if ty.float {
                    Ok(from_f64(ty, -to_f64(ty, inputs[0])))
                } else {
                    Ok(mask(ty, inputs[0].wrapping_neg()))
                }
            }
            Builtin::BitNot(ty) => Ok(mask(ty, !inputs[0])),
            Builtin::Binary { op, ty } => binary(op, ty, inputs[0], inputs[1]),
            Builtin::Compare { op, ty } => Ok(u64::from(compare(op, ty, inputs[0], inputs[1]))),
            Builtin::Cast { from, to } => Ok(cast(from, to, inputs[0])),
            Builtin::ToBool { from } => Ok(u64::from(mask(from, inputs[0]) != 0)),
            Builtin::ForInit(ty) => {
                let (start, step, end) = (inputs[0], inputs[1], inputs[2]);
                let enter = if is_negative(ty, step) {
                    compare(CompareOp::Ge, ty, start, end)
                } else {
                    compare(CompareOp::Le, ty, start, end)
                };
                Ok(u64::from(enter))
            }
            // Writes through its pointer input; the interpreter dispatches
            // it to `for_next` instead of coming through here.
            Builtin::ForNext(_) => Ok(0),
        }
    }
}

/// Advances a `FOR` control value by one step; returns the new value and
/// whether another iteration runs.
pub(crate) fn for_next(ty: NumTy, control: u64, step: u64, end: u64) -> (u64, u64) {
    let next = mask(ty, control.wrapping_add(step));
    let more = if is_negative(ty, step) {
        compare(CompareOp::Ge, ty, next, end)
    } else {
        compare(CompareOp::Le, ty, next, end)
    };
    (next, u64::from(more))
}

fn mask(ty: NumTy, bits: u64) -> u64 {
    if ty.bytes >= 8 {
        bits
    } else {
        bits & ((1u64 << (u32::from(ty.bytes) * 8)) - 1)
    }
}

fn signed(ty: NumTy, bits: u64) -> i64 {
    let shift = 64 - u32::from(ty.bytes) * 8;
    if shift == 0 {
        bits as i64
    } else {
        ((bits << shift) as i64) >> shift
    }
}

fn is_negative(ty: NumTy, bits: u64) -> bool {
    ty.signed && !ty.float && signed(ty, bits) < 0
}

fn to_f64(ty: NumTy, bits: u64) -> f64 {
    if ty.bytes == 4 {
        f64::from(f32::from_bits(bits as u32))
    } else {
        f64::from_bits(bits)
    }
}

fn from_f64(ty: NumTy, value: f64) -> u64 {
    if ty.bytes == 4 {
        u64::from((value as f32).to_bits())
    } else {
        value.to_bits()
    }
}

fn binary(op: BinaryOp, ty: NumTy, a: u64, b: u64) -> Result<u64, PanicReason> {
    match op {
        BinaryOp::And => return Ok(mask(ty, a & b)),
        BinaryOp::Or => return Ok(mask(ty, a | b)),
        BinaryOp::Xor => return Ok(mask(ty, a ^ b)),
        _ => {}
    }
    if ty.float {
        let (x, y) = (to_f64(ty, a), to_f64(ty, b));
        let result = match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            // IEEE semantics: float division by zero is infinity, not a panic.
            BinaryOp::Div => x / y,
            BinaryOp::Mod => x % y,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => 0.0,
        };
        return Ok(from_f64(ty, result));
    }
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && mask(ty, b) == 0 {
        return Err(PanicReason::DivisionByZero);
    }
    let result = if ty.signed {
        let (x, y) = (signed(ty, a), signed(ty, b));
        let value = match op {
            BinaryOp::Add => x.wrapping_add(y),
            BinaryOp::Sub => x.wrapping_sub(y),
            BinaryOp::Mul => x.wrapping_mul(y),
            BinaryOp::Div => x.wrapping_div(y),
            BinaryOp::Mod => x.wrapping_rem(y),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => 0,
        };
        value as u64
    } else {
        let (x, y) = (mask(ty, a), mask(ty, b));
        match op {
            BinaryOp::Add => x.wrapping_add(y),
            BinaryOp::Sub => x.wrapping_sub(y),
            BinaryOp::Mul => x.wrapping_mul(y),
            BinaryOp::Div => x / y,
            BinaryOp::Mod => x % y,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => 0,
        }
    };
    Ok(mask(ty, result))
}

fn compare(op: CompareOp, ty: NumTy, a: u64, b: u64) -> bool {
    if ty.float {
        let (x, y) = (to_f64(ty, a), to_f64(ty, b));
        match op {
            CompareOp::Eq => x == y,
            CompareOp::Ne => x != y,
            CompareOp::Lt => x < y,
            CompareOp::Le => x <= y,
            CompareOp::Gt => x > y,
            CompareOp::Ge => x >= y,
        }
    } else if ty.signed {
        let (x, y) = (signed(ty, a), signed(ty, b));
        match op {
            CompareOp::Eq => x == y,
            CompareOp::Ne => x != y,
            CompareOp::Lt => x < y,
            CompareOp::Le => x <= y,
            CompareOp::Gt => x > y,
            CompareOp::Ge => x >= y,
        }
    } else {
        let (x, y) = (mask(ty, a), mask(ty, b));
        match op {
            CompareOp::Eq => x == y,
            CompareOp::Ne => x != y,
            CompareOp::Lt => x < y,
            CompareOp::Le => x <= y,
            CompareOp::Gt => x > y,
            CompareOp::Ge => x >= y,
        }
    }
}

fn cast(from: NumTy, to: NumTy, bits: u64) -> u64 {
    if from.float && to.float {
        from_f64(to, to_f64(from, bits))
    } else if from.float {
        let value = to_f64(from, bits);
        if to.signed {
            mask(to, (value as i64) as u64)
        } else {
            mask(to, value as u64)
        }
    } else if to.float {
        let value = if from.signed {
            signed(from, bits) as f64
        } else {
            mask(from, bits) as f64
        };
        from_f64(to, value)
    } else if from.signed {
        mask(to, signed(from, bits) as u64)
    } else {
        mask(to, mask(from, bits))
    }
}
