//! 산술/비트/비교 연산
//!
//! int 연산은 2의 보수로 wrap 됩니다. 피연산자 중 하나라도 real이면 결과는 real입니다.

use super::{Vm, VmErrorKind, VmResult, err};
use crate::vm::bytecode::Opcode;
use crate::vm::utils::compare_eq;
use crate::vm::value::Value;

/// 복합 대입 opcode → 이항 연산 opcode
pub(super) fn compound_op(op: Opcode) -> Option<Opcode> {
    use Opcode::*;
    Some(match op {
        AssignAdd => Add,
        AssignSub => Sub,
        AssignMul => Mul,
        AssignDiv => Div,
        AssignMod => Mod,
        AssignExp => Exp,
        AssignAnd => Band,
        AssignOr => Bor,
        AssignXor => Bxor,
        AssignShl => Shl,
        AssignShr => Shr,
        _ => return None,
    })
}

fn verb(op: Opcode) -> &'static str {
    use Opcode::*;
    match op {
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        Div => "div",
        Mod => "mod",
        Exp => "exp",
        Bxor => "bitwise xor",
        Bor => "bitwise or",
        Band => "bitwise and",
        Shl => "shift left",
        Shr => "shift right",
        _ => "compare",
    }
}

fn type_error(op: Opcode, a: Value, b: Value) -> super::VmError {
    err(
        VmErrorKind::TypeError,
        format!(
            "Cannot {} {} and {}.",
            verb(op),
            a.value_type(),
            b.value_type()
        ),
    )
}

fn zero_division() -> super::VmError {
    err(VmErrorKind::ZeroDivision, "Division by zero.")
}

/// 둘 중 하나라도 real이면 둘 다 real로
fn as_reals(a: Value, b: Value) -> Option<(f32, f32)> {
    match (a, b) {
        (Value::Real(x), Value::Real(y)) => Some((x, y)),
        (Value::Int(x), Value::Real(y)) => Some((x as f32, y)),
        (Value::Real(x), Value::Int(y)) => Some((x, y as f32)),
        _ => None,
    }
}

impl Vm {
    pub(super) fn binary_op(&mut self, op: Opcode, a: Value, b: Value) -> VmResult<Value> {
        use Opcode::*;
        match op {
            Add => self.add(a, b),
            Sub | Div | Mod => match (a, b) {
                (Value::Int(x), Value::Int(y)) => int_arith(op, x, y),
                _ => match as_reals(a, b) {
                    Some((x, y)) => Ok(Value::Real(match op {
                        Sub => x - y,
                        Div => x / y,
                        _ => x % y,
                    })),
                    None => Err(type_error(op, a, b)),
                },
            },
            Mul => self.mul(a, b),
            Exp => match (a, b) {
                (Value::Int(x), Value::Int(y)) => Ok(Value::Int((x as f64).powf(y as f64) as i32)),
                _ => match as_reals(a, b) {
                    Some((x, y)) => Ok(Value::Real(x.powf(y))),
                    None => Err(type_error(op, a, b)),
                },
            },
            Bxor | Bor | Band | Shl | Shr => match (a, b) {
                (Value::Int(x), Value::Int(y)) => Ok(Value::Int(match op {
                    Bxor => x ^ y,
                    Bor => x | y,
                    Band => x & y,
                    Shl => x.wrapping_shl(y as u32),
                    _ => x.wrapping_shr(y as u32),
                })),
                _ => Err(type_error(op, a, b)),
            },
            Lor => Ok(Value::from_bool(a.is_truthy() || b.is_truthy())),
            Land => Ok(Value::from_bool(a.is_truthy() && b.is_truthy())),
            Eq => Ok(Value::from_bool(compare_eq(&self.heap, a, b))),
            Neq => Ok(Value::from_bool(!compare_eq(&self.heap, a, b))),
            Gt | Ge | Lt | Le => {
                let ord = match (a, b) {
                    (Value::Int(x), Value::Int(y)) => x.partial_cmp(&y),
                    (Value::Real(x), Value::Real(y)) => x.partial_cmp(&y),
                    _ => return Err(type_error(op, a, b)),
                };
                let r = match ord {
                    Some(o) => match op {
                        Gt => o.is_gt(),
                        Ge => o.is_ge(),
                        Lt => o.is_lt(),
                        _ => o.is_le(),
                    },
                    // NaN
                    None => false,
                };
                Ok(Value::from_bool(r))
            }
            _ => Err(err(
                VmErrorKind::UnknownOpcode,
                format!("{} is not a binary operator.", op),
            )),
        }
    }

    fn add(&mut self, a: Value, b: Value) -> VmResult<Value> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(y))),
            (Value::Str(x), Value::Str(y)) => {
                let joined = {
                    let (l, r) = (self.heap.str(x)?, self.heap.str(y)?);
                    let mut s = String::with_capacity(l.len() + r.len());
                    s.push_str(l);
                    s.push_str(r);
                    s
                };
                Ok(Value::Str(self.heap.new_string(&joined)))
            }
            _ => match as_reals(a, b) {
                Some((x, y)) => Ok(Value::Real(x + y)),
                None => Err(type_error(Opcode::Add, a, b)),
            },
        }
    }

    fn mul(&mut self, a: Value, b: Value) -> VmResult<Value> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_mul(y))),
            (Value::List(h), Value::Int(n)) | (Value::Int(n), Value::List(h)) => {
                let items = {
                    let src = &self.heap.list(h)?.items;
                    let times = n.max(0) as usize;
                    let mut items = Vec::with_capacity(src.len() * times);
                    for _ in 0..times {
                        items.extend_from_slice(src);
                    }
                    items
                };
                Ok(Value::List(self.heap.alloc_list(items)))
            }
            _ => match as_reals(a, b) {
                Some((x, y)) => Ok(Value::Real(x * y)),
                None => Err(type_error(Opcode::Mul, a, b)),
            },
        }
    }

    pub(super) fn unary_op(&mut self, op: Opcode, v: Value) -> VmResult<Value> {
        use Opcode::*;
        let verb = match op {
            Minus => "minus",
            Inc => "inc",
            Dec => "dec",
            Bnot => "bitwise not",
            _ => "",
        };
        let r = match (op, v) {
            (Lnot, _) => Some(Value::from_bool(!v.is_truthy())),
            (Minus, Value::Int(i)) => Some(Value::Int(i.wrapping_neg())),
            (Minus, Value::Real(f)) => Some(Value::Real(-f)),
            (Inc, Value::Int(i)) => Some(Value::Int(i.wrapping_add(1))),
            (Inc, Value::Real(f)) => Some(Value::Real(f + 1.0)),
            (Dec, Value::Int(i)) => Some(Value::Int(i.wrapping_sub(1))),
            (Dec, Value::Real(f)) => Some(Value::Real(f - 1.0)),
            (Bnot, Value::Int(i)) => Some(Value::Int(!i)),
            _ => None,
        };
        r.ok_or_else(|| {
            err(
                VmErrorKind::TypeError,
                format!("Cannot {} {}.", verb, v.value_type()),
            )
        })
    }
}

fn int_arith(op: Opcode, x: i32, y: i32) -> VmResult<Value> {
    Ok(Value::Int(match op {
        Opcode::Sub => x.wrapping_sub(y),
        Opcode::Div if y == 0 => return Err(zero_division()),
        Opcode::Div => x.wrapping_div(y),
        Opcode::Mod if y == 0 => return Err(zero_division()),
        _ => x.wrapping_rem(y),
    }))
}
