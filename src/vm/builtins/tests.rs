use crate::config::Config;
use crate::runtime_io::BufferIo;
use crate::vm::machine::{Vm, VmErrorKind, VmResult};
use crate::vm::module::BUILTINS_ID;
use crate::vm::value::Value;

fn vm_with_buffer() -> (Vm, BufferIo) {
    let io = BufferIo::new();
    let vm = Vm::with_config(Config::default(), Box::new(io.clone()));
    (vm, io)
}

fn call_builtin(vm: &mut Vm, name: &str, args: &[Value]) -> VmResult<Value> {
    let f = *vm.modules[BUILTINS_ID as usize]
        .globals
        .get_by_name(name)
        .unwrap();
    vm.push(f).unwrap();
    for a in args {
        vm.push(*a).unwrap();
    }
    vm.call(args.len())
}

#[test]
fn test_print_and_println() {
    let (mut vm, io) = vm_with_buffer();
    call_builtin(&mut vm, "print", &[Value::Int(1)]).unwrap();
    call_builtin(&mut vm, "println", &[Value::Real(2.5)]).unwrap();
    call_builtin(&mut vm, "println", &[]).unwrap();
    assert_eq!(io.get_output(), "12.500000\n\n");
    assert!(vm.stack.is_empty());
}

#[test]
fn test_print_requires_argument() {
    let (mut vm, _io) = vm_with_buffer();
    let e = call_builtin(&mut vm, "print", &[]).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::Native);
    assert!(e.message.starts_with("print():"));
}

#[test]
fn test_int_conversion() {
    let (mut vm, _io) = vm_with_buffer();
    let s = Value::Str(vm.heap.intern_const("42abc"));
    assert_eq!(call_builtin(&mut vm, "int", &[s]).unwrap(), Value::Int(42));
    assert_eq!(
        call_builtin(&mut vm, "int", &[Value::Real(-3.9)]).unwrap(),
        Value::Int(-3)
    );
    let junk = Value::Str(vm.heap.intern_const("abc"));
    assert_eq!(call_builtin(&mut vm, "int", &[junk]).unwrap(), Value::Int(0));
}

#[test]
fn test_float_and_str_conversion() {
    let (mut vm, _io) = vm_with_buffer();
    assert_eq!(
        call_builtin(&mut vm, "float", &[Value::Int(2)]).unwrap(),
        Value::Real(2.0)
    );
    let r = call_builtin(&mut vm, "str", &[Value::Real(1.5)]).unwrap();
    let Value::Str(s) = r else {
        panic!("expected string, got {:?}", r);
    };
    assert_eq!(vm.heap.str(s).unwrap(), "1.500000");
}

#[test]
fn test_abs() {
    let (mut vm, _io) = vm_with_buffer();
    assert_eq!(
        call_builtin(&mut vm, "abs", &[Value::Int(-5)]).unwrap(),
        Value::Int(5)
    );
    assert_eq!(
        call_builtin(&mut vm, "abs", &[Value::Real(-0.5)]).unwrap(),
        Value::Real(0.5)
    );
    assert!(call_builtin(&mut vm, "abs", &[Value::None]).is_err());
}

#[test]
fn test_len() {
    let (mut vm, _io) = vm_with_buffer();
    let list = Value::List(vm.heap.alloc_list(vec![Value::Int(1), Value::Int(2)]));
    assert_eq!(call_builtin(&mut vm, "len", &[list]).unwrap(), Value::Int(2));
    let s = Value::Str(vm.heap.intern_const("hello"));
    assert_eq!(call_builtin(&mut vm, "len", &[s]).unwrap(), Value::Int(5));
    let e = call_builtin(&mut vm, "len", &[Value::Int(3)]).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::Native);
}

#[test]
fn test_env_missing_is_none() {
    let (mut vm, _io) = vm_with_buffer();
    let name = Value::Str(vm.heap.intern_const("MSL_SURELY_UNSET_VARIABLE"));
    assert_eq!(call_builtin(&mut vm, "env", &[name]).unwrap(), Value::None);
}

#[test]
fn test_sleep_and_tick() {
    let (mut vm, _io) = vm_with_buffer();
    assert!(call_builtin(&mut vm, "sleep", &[Value::Int(-1)]).is_err());
    call_builtin(&mut vm, "sleep", &[Value::Int(1)]).unwrap();
    let Value::Int(t) = call_builtin(&mut vm, "tick", &[]).unwrap() else {
        panic!("tick() must return an int");
    };
    assert!(t >= 1);
}

#[test]
fn test_info_writes_version() {
    let (mut vm, io) = vm_with_buffer();
    call_builtin(&mut vm, "info", &[]).unwrap();
    assert!(io.get_output().contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_builtins_are_registered() {
    let vm = Vm::new();
    for b in crate::builtins::all() {
        assert!(
            vm.modules[BUILTINS_ID as usize]
                .globals
                .get_by_name(b.name)
                .is_some(),
            "{} missing",
            b.name
        );
    }
}
