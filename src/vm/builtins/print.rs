use super::expect_args;
use crate::vm::machine::{Vm, VmResult};
use crate::vm::utils::display_value;
use crate::vm::value::Value;

/// print(x): 줄바꿈 없이 출력
pub fn print(vm: &mut Vm) -> VmResult<Value> {
    expect_args(vm, "print", 1)?;
    let text = display_value(vm, vm.arg(1));
    vm.io.write(&text);
    vm.io.flush();
    Ok(Value::None)
}

/// println(x): 인자가 없으면 빈 줄
pub fn println(vm: &mut Vm) -> VmResult<Value> {
    let text = if vm.param_count() == 0 {
        String::new()
    } else {
        display_value(vm, vm.arg(1))
    };
    vm.io.write_line(&text);
    Ok(Value::None)
}

/// info(): 런타임 정보
pub fn info(vm: &mut Vm) -> VmResult<Value> {
    let line = format!(
        "Matrix Script Language {} ({} modules, {} lists, {} dicts live)",
        env!("CARGO_PKG_VERSION"),
        vm.modules.len(),
        vm.heap.lists.live(),
        vm.heap.dicts.live()
    );
    vm.io.write_line(&line);
    vm.io.write_line(&format!("license: {}", env!("CARGO_PKG_LICENSE")));
    Ok(Value::None)
}
