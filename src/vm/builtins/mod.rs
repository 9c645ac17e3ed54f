// builtin 네이티브 함수
//
// 모든 builtin은 `fn(&mut Vm) -> VmResult<Value>` 모양이며 `__builtins__` 모듈과
// 모든 스크립트 모듈의 전역 테이블에 등록됩니다. 등록 목록은 `crate::builtins`에 있습니다.

pub mod convert;
pub mod math;
pub mod print;
pub mod system;

#[cfg(test)]
mod tests;

use super::machine::{Vm, VmError, VmErrorKind, VmResult, err};
use super::value::Value;

// ========== 헬퍼 함수들 ==========

pub(crate) fn native_error(name: &str, message: impl std::fmt::Display) -> VmError {
    err(VmErrorKind::Native, format!("{}(): {}", name, message))
}

/// 최소 `n`개의 인자가 있는지 확인
pub(crate) fn expect_args(vm: &Vm, name: &str, n: usize) -> VmResult<()> {
    if vm.param_count() < n {
        return Err(native_error(
            name,
            format!(
                "expected {} argument{}, got {}",
                n,
                if n == 1 { "" } else { "s" },
                vm.param_count()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn int_arg(vm: &Vm, name: &str, i: usize) -> VmResult<i32> {
    match vm.arg(i) {
        Value::Int(v) => Ok(v),
        other => Err(native_error(
            name,
            format!("argument {} must be int, not {}", i, other.value_type()),
        )),
    }
}
