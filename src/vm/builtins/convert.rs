//! 타입 변환과 값 검사 builtin

use super::{expect_args, native_error};
use crate::vm::machine::{Vm, VmResult};
use crate::vm::utils::{to_int, to_real, to_str};
use crate::vm::value::Value;

pub fn int(vm: &mut Vm) -> VmResult<Value> {
    expect_args(vm, "int", 1)?;
    Ok(Value::Int(to_int(&vm.heap, vm.arg(1))?))
}

pub fn float(vm: &mut Vm) -> VmResult<Value> {
    expect_args(vm, "float", 1)?;
    Ok(Value::Real(to_real(&vm.heap, vm.arg(1))?))
}

pub fn str(vm: &mut Vm) -> VmResult<Value> {
    expect_args(vm, "str", 1)?;
    let v = vm.arg(1);
    Ok(Value::Str(to_str(&mut vm.heap, v)?))
}

pub fn abs(vm: &mut Vm) -> VmResult<Value> {
    expect_args(vm, "abs", 1)?;
    match vm.arg(1) {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Real(f) => Ok(Value::Real(f.abs())),
        other => Err(native_error(
            "abs",
            format!("bad operand type {}", other.value_type()),
        )),
    }
}

/// len(x): 리스트/딕셔너리 원소 수, 문자열 바이트 길이
pub fn len(vm: &mut Vm) -> VmResult<Value> {
    expect_args(vm, "len", 1)?;
    let n = match vm.arg(1) {
        Value::List(h) => vm.heap.list(h)?.items.len(),
        Value::Dict(h) => vm.heap.dict_len(h)?,
        Value::Str(s) => vm.heap.str(s)?.len(),
        other => {
            return Err(native_error(
                "len",
                format!("{} has no length", other.value_type()),
            ));
        }
    };
    Ok(Value::Int(n as i32))
}
