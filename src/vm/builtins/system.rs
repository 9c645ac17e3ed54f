use std::time::Duration;

use super::{expect_args, int_arg, native_error};
use crate::vm::machine::{Vm, VmResult};
use crate::vm::value::Value;

/// tick(): 런타임 생성 이후 밀리초
pub fn tick(vm: &mut Vm) -> VmResult<Value> {
    Ok(Value::Int(vm.elapsed_ms() as i32))
}

pub fn sleep(vm: &mut Vm) -> VmResult<Value> {
    expect_args(vm, "sleep", 1)?;
    let ms = int_arg(vm, "sleep", 1)?;
    if ms < 0 {
        return Err(native_error("sleep", "negative duration"));
    }
    std::thread::sleep(Duration::from_millis(ms as u64));
    Ok(Value::None)
}

/// env(name): 환경 변수, 없으면 none
pub fn env(vm: &mut Vm) -> VmResult<Value> {
    expect_args(vm, "env", 1)?;
    let key = match vm.arg(1) {
        Value::Str(s) => vm.heap.str(s)?.to_string(),
        other => {
            return Err(native_error(
                "env",
                format!("name must be string, not {}", other.value_type()),
            ));
        }
    };
    match std::env::var(&key) {
        Ok(v) => Ok(Value::Str(vm.heap.new_string(&v))),
        Err(_) => Ok(Value::None),
    }
}
