//! VM 테스트 모듈

use super::*;
use crate::vm::builtins::math::MathModule;
use crate::vm::value::StrRef;

/// 모듈 하나를 만들고 최상위 코드를 직접 조립합니다.
fn module_with(vm: &mut Vm, build: impl FnOnce(&mut CodeBuffer)) -> ModuleId {
    let id = vm.add_module("t");
    build(&mut vm.modules[id as usize].code);
    id
}

fn op(code: &mut CodeBuffer, op: Opcode, operands: &[u32]) {
    code.emit_op(op, 1);
    for &w in operands {
        code.emit(w);
    }
}

fn run_expr(build: impl FnOnce(&mut CodeBuffer)) -> VmResult<Value> {
    let mut vm = Vm::new();
    let id = module_with(&mut vm, |c| {
        build(c);
        op(c, Opcode::RetResult, &[]);
    });
    vm.exec_module(id)
}

const CUR: u32 = u32::MAX; // mod -1

// ========== 스택 연산 테스트 ==========

#[test]
fn test_stack_push_pop() {
    let mut vm = Vm::new();
    assert!(vm.push(Value::Int(42)).is_ok());
    assert_eq!(vm.pop().unwrap(), Value::Int(42));
}

#[test]
fn test_stack_underflow() {
    let mut vm = Vm::new();
    let result = vm.pop();
    assert!(matches!(result, Err(e) if e.kind == VmErrorKind::StackUnderflow));
}

#[test]
fn test_stack_overflow() {
    let mut vm = Vm::new();
    vm.max_stack = 2;
    assert!(vm.push(Value::Int(1)).is_ok());
    assert!(vm.push(Value::Int(2)).is_ok());
    let result = vm.push(Value::Int(3));
    assert!(matches!(result, Err(e) if e.kind == VmErrorKind::StackOverflow));
}

#[test]
fn test_stack_value_positions() {
    let mut vm = Vm::new();
    vm.push(Value::Int(1)).unwrap();
    vm.push(Value::Int(2)).unwrap();
    assert_eq!(vm.stack_value(-1), Some(Value::Int(2)));
    assert_eq!(vm.stack_value(-2), Some(Value::Int(1)));
    assert_eq!(vm.stack_value(-3), None);
    assert_eq!(vm.stack_value(0), None);
}

// ========== 명령어별 단위 테스트 ==========

#[test]
fn test_const_instructions() {
    let r = run_expr(|c| op(c, Opcode::PushInt, &[42]));
    assert_eq!(r.unwrap(), Value::Int(42));

    let r = run_expr(|c| op(c, Opcode::PushReal, &[2.5f32.to_bits()]));
    assert_eq!(r.unwrap(), Value::Real(2.5));

    let r = run_expr(|c| op(c, Opcode::PushNone, &[]));
    assert_eq!(r.unwrap(), Value::None);
}

#[test]
fn test_int_arithmetic_wraps() {
    let r = run_expr(|c| {
        op(c, Opcode::PushInt, &[i32::MAX as u32]);
        op(c, Opcode::PushInt, &[1]);
        op(c, Opcode::Add, &[]);
    });
    assert_eq!(r.unwrap(), Value::Int(i32::MIN));

    let r = run_expr(|c| {
        op(c, Opcode::PushInt, &[i32::MIN as u32]);
        op(c, Opcode::PushInt, &[(-1i32) as u32]);
        op(c, Opcode::Div, &[]);
    });
    assert_eq!(r.unwrap(), Value::Int(i32::MIN));
}

#[test]
fn test_division_by_zero() {
    let mut vm = Vm::new();
    let id = module_with(&mut vm, |c| {
        op(c, Opcode::PushInt, &[7]);
        c.emit_op(Opcode::PushInt, 3);
        c.emit(0);
        c.emit_op(Opcode::Div, 3);
    });
    let e = vm.exec_module(id).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::ZeroDivision);
    assert_eq!(e.line, Some(3));
    assert_eq!(e.to_string(), "t:3: Division by zero.");
    assert_eq!(vm.get_state(), VmState::Error);
    assert!(vm.stack.is_empty());
    assert!(vm.frames.is_empty());

    let r = run_expr(|c| {
        op(c, Opcode::PushInt, &[7]);
        op(c, Opcode::PushInt, &[0]);
        op(c, Opcode::Mod, &[]);
    });
    assert!(matches!(r, Err(e) if e.kind == VmErrorKind::ZeroDivision));
}

#[test]
fn test_mixed_promotes_to_real() {
    let r = run_expr(|c| {
        op(c, Opcode::PushInt, &[1]);
        op(c, Opcode::PushReal, &[0.5f32.to_bits()]);
        op(c, Opcode::Add, &[]);
    });
    assert_eq!(r.unwrap(), Value::Real(1.5));

    let r = run_expr(|c| {
        op(c, Opcode::PushInt, &[2]);
        op(c, Opcode::PushInt, &[10]);
        op(c, Opcode::Exp, &[]);
    });
    assert_eq!(r.unwrap(), Value::Int(1024));
}

#[test]
fn test_ordering_requires_same_type() {
    let r = run_expr(|c| {
        op(c, Opcode::PushInt, &[1]);
        op(c, Opcode::PushReal, &[2.0f32.to_bits()]);
        op(c, Opcode::Lt, &[]);
    });
    assert!(matches!(r, Err(e) if e.kind == VmErrorKind::TypeError));

    let r = run_expr(|c| {
        op(c, Opcode::PushInt, &[1]);
        op(c, Opcode::PushInt, &[2]);
        op(c, Opcode::Lt, &[]);
    });
    assert_eq!(r.unwrap(), Value::Int(1));
}

#[test]
fn test_string_concat_and_equality() {
    let mut vm = Vm::new();
    let ab = vm.heap.consts.intern("ab").index;
    let cd = vm.heap.consts.intern("cd").index;
    let abcd = vm.heap.consts.intern("abcd").index;
    let id = module_with(&mut vm, |c| {
        op(c, Opcode::PushString, &[ab]);
        op(c, Opcode::PushString, &[cd]);
        op(c, Opcode::Add, &[]);
        op(c, Opcode::PushString, &[abcd]);
        op(c, Opcode::Eq, &[]);
        op(c, Opcode::RetResult, &[]);
    });
    assert_eq!(vm.exec_module(id).unwrap(), Value::Int(1));
}

#[test]
fn test_bad_string_index() {
    let r = run_expr(|c| op(c, Opcode::PushString, &[9999]));
    assert!(matches!(r, Err(e) if e.kind == VmErrorKind::InvalidIndex));
}

#[test]
fn test_conditional_jumps() {
    // none이면 점프해서 2를 반환
    let r = run_expr(|c| {
        op(c, Opcode::PushNone, &[]);
        op(c, Opcode::FalseJmp, &[6]);
        op(c, Opcode::PushInt, &[1]);
        op(c, Opcode::RetResult, &[]);
        op(c, Opcode::PushInt, &[2]);
    });
    assert_eq!(r.unwrap(), Value::Int(2));
}

#[test]
fn test_global_assign_and_read() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let x = vm.modules[id as usize].globals.set("x", Value::Dummy);
    let code = &mut vm.modules[id as usize].code;
    op(code, Opcode::PushInt, &[5]);
    op(code, Opcode::Assign, &[CUR, x, 0]);
    op(code, Opcode::PushInt, &[3]);
    op(code, Opcode::AssignMul, &[CUR, x, 0]);
    op(code, Opcode::PushObj, &[CUR, x, 0]);
    op(code, Opcode::RetResult, &[]);
    assert_eq!(vm.exec_module(id).unwrap(), Value::Int(15));
    assert_eq!(vm.modules[id as usize].global(x), Some(Value::Int(15)));
}

#[test]
fn test_undefined_variable() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let x = vm.modules[id as usize].globals.set("x", Value::Dummy);
    op(&mut vm.modules[id as usize].code, Opcode::PushObj, &[CUR, x, 0]);
    let e = vm.exec_module(id).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::Undefined);
    assert_eq!(e.message, "The variable \"x\" is not defined.");
}

#[test]
fn test_list_index_and_assign() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let l = vm.modules[id as usize].globals.set("l", Value::Dummy);
    let code = &mut vm.modules[id as usize].code;
    // l = [10, 20]; l[1] = 7; return l[1] + l[0];
    op(code, Opcode::PushInt, &[10]);
    op(code, Opcode::PushInt, &[20]);
    op(code, Opcode::MakeList, &[2]);
    op(code, Opcode::Assign, &[CUR, l, 0]);
    op(code, Opcode::PushInt, &[1]);
    op(code, Opcode::PushInt, &[7]);
    op(code, Opcode::Assign, &[CUR, l, 1]);
    op(code, Opcode::PushInt, &[1]);
    op(code, Opcode::PushObj, &[CUR, l, 1]);
    op(code, Opcode::PushInt, &[0]);
    op(code, Opcode::PushObj, &[CUR, l, 1]);
    op(code, Opcode::Add, &[]);
    op(code, Opcode::RetResult, &[]);
    assert_eq!(vm.exec_module(id).unwrap(), Value::Int(17));
}

#[test]
fn test_list_index_out_of_range() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let l = vm.modules[id as usize].globals.set("l", Value::Dummy);
    let code = &mut vm.modules[id as usize].code;
    op(code, Opcode::MakeList, &[0]);
    op(code, Opcode::Assign, &[CUR, l, 0]);
    op(code, Opcode::PushInt, &[0]);
    op(code, Opcode::PushObj, &[CUR, l, 1]);
    let e = vm.exec_module(id).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::InvalidIndex);
}

#[test]
fn test_dict_insert_through_assign() {
    let mut vm = Vm::new();
    let k = vm.heap.consts.intern("k").index;
    let id = vm.add_module("t");
    let d = vm.modules[id as usize].globals.set("d", Value::Dummy);
    let code = &mut vm.modules[id as usize].code;
    op(code, Opcode::MakeDict, &[0]);
    op(code, Opcode::Assign, &[CUR, d, 0]);
    op(code, Opcode::PushString, &[k]);
    op(code, Opcode::PushInt, &[9]);
    op(code, Opcode::Assign, &[CUR, d, 1]);
    op(code, Opcode::PushString, &[k]);
    op(code, Opcode::PushObj, &[CUR, d, 1]);
    op(code, Opcode::RetResult, &[]);
    assert_eq!(vm.exec_module(id).unwrap(), Value::Int(9));
}

#[test]
fn test_unhashable_dict_key() {
    let r = run_expr(|c| {
        op(c, Opcode::PushReal, &[1.0f32.to_bits()]);
        op(c, Opcode::PushInt, &[1]);
        op(c, Opcode::MakeDict, &[1]);
    });
    assert!(matches!(r, Err(e) if e.kind == VmErrorKind::Unhashable));
}

#[test]
fn test_index_non_container() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let x = vm.modules[id as usize].globals.set("x", Value::Int(3));
    let code = &mut vm.modules[id as usize].code;
    op(code, Opcode::PushInt, &[0]);
    op(code, Opcode::PushObj, &[CUR, x, 1]);
    let e = vm.exec_module(id).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::NotIndexable);
}

// ========== 호출 ==========

/// `def second(a, b) { return b; }`
fn add_second(vm: &mut Vm, module: ModuleId) -> Value {
    let mut f = Function::new("second");
    f.arity = 2;
    f.locals.set("a", ());
    f.locals.set("b", ());
    op(&mut f.code, Opcode::PushObj, &[CUR, (-2i32) as u32, 0]);
    op(&mut f.code, Opcode::RetResult, &[]);
    let m = &mut vm.modules[module as usize];
    m.functions.push(f);
    Value::Func(FuncRef {
        module,
        index: (m.functions.len() - 1) as u32,
    })
}

#[test]
fn test_call_pads_missing_args() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let f = add_second(&mut vm, id);
    vm.push(f).unwrap();
    vm.push(Value::Int(1)).unwrap();
    assert_eq!(vm.call(1).unwrap(), Value::None);
    assert!(vm.stack.is_empty());
}

#[test]
fn test_call_truncates_surplus_args() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let f = add_second(&mut vm, id);
    vm.push(f).unwrap();
    for i in 1..=4 {
        vm.push(Value::Int(i)).unwrap();
    }
    assert_eq!(vm.call(4).unwrap(), Value::Int(2));
    assert!(vm.stack.is_empty());
}

#[test]
fn test_call_from_bytecode() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let f = add_second(&mut vm, id);
    let slot = vm.modules[id as usize].globals.set("second", f);
    let code = &mut vm.modules[id as usize].code;
    op(code, Opcode::PushObj, &[CUR, slot, 0]);
    op(code, Opcode::PushInt, &[5]);
    op(code, Opcode::PushInt, &[6]);
    op(code, Opcode::Call, &[2]);
    op(code, Opcode::RetResult, &[]);
    assert_eq!(vm.exec_module(id).unwrap(), Value::Int(6));
}

#[test]
fn test_call_non_callable() {
    let mut vm = Vm::new();
    vm.push(Value::Int(3)).unwrap();
    let e = vm.call(0).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::NotCallable);
    assert!(vm.stack.is_empty());
}

#[test]
fn test_frame_overflow() {
    let mut vm = Vm::new();
    vm.max_frames = 16;
    let id = vm.add_module("t");
    // def f() { return f(); }
    let slot = vm.modules[id as usize].globals.set("f", Value::Dummy);
    let mut f = Function::new("f");
    op(&mut f.code, Opcode::PushObj, &[CUR, slot, 0]);
    op(&mut f.code, Opcode::Call, &[0]);
    op(&mut f.code, Opcode::RetResult, &[]);
    vm.modules[id as usize].functions.push(f);
    let fv = Value::Func(FuncRef { module: id, index: 0 });
    vm.modules[id as usize].set_global(slot, fv);

    vm.push(fv).unwrap();
    let e = vm.call(0).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::FrameOverflow);
    assert!(vm.frames.is_empty());
    assert!(vm.stack.is_empty());
}

#[test]
fn test_native_call_result() {
    let mut vm = Vm::new();
    vm.push(Value::Native(crate::vm::builtins::convert::abs)).unwrap();
    vm.push(Value::Int(-4)).unwrap();
    assert_eq!(vm.call(1).unwrap(), Value::Int(4));
}

// ========== import ==========

#[test]
fn test_import_native_module() {
    let mut vm = Vm::new();
    vm.register_native_module(Rc::new(MathModule));
    let name = vm.heap.consts.intern("math").index;
    let id = module_with(&mut vm, |c| op(c, Opcode::Import, &[name]));
    vm.exec_module(id).unwrap();

    let math = vm.module_id("math").unwrap();
    let m = &vm.modules[math as usize];
    assert!(m.init);
    assert!(matches!(m.kind, ModuleKind::Native { .. }));
    assert!(m.globals.get_by_name("randint").is_some());

    vm.close_plugins();
    assert!(!vm.modules[math as usize].init);
}

#[test]
fn test_import_missing_module() {
    let mut vm = Vm::new();
    vm.config.search_paths.clear();
    let name = vm.heap.consts.intern("does_not_exist").index;
    let id = module_with(&mut vm, |c| op(c, Opcode::Import, &[name]));
    let e = vm.exec_module(id).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::Load);
    assert!(e.message.contains("does_not_exist"));
    // 런타임은 계속 쓸 수 있어야 함
    assert!(vm.push(Value::None).is_ok());
}

#[test]
fn test_unknown_opcode() {
    let mut vm = Vm::new();
    let id = module_with(&mut vm, |c| {
        c.emit(9999);
    });
    let e = vm.exec_module(id).unwrap_err();
    assert_eq!(e.kind, VmErrorKind::UnknownOpcode);
}

// ========== GC ==========

#[test]
fn test_gc_keeps_globals() {
    let mut vm = Vm::new();
    let id = vm.add_module("t");
    let s = vm.heap.new_string("kept");
    let list = vm.heap.alloc_list(vec![Value::Str(s)]);
    vm.modules[id as usize].globals.set("l", Value::List(list));
    vm.heap.new_string("garbage");

    let stats = vm.gc();
    assert_eq!(stats.strings, 1);
    assert_eq!(vm.heap.list(list).unwrap().items, vec![Value::Str(s)]);
    assert_eq!(vm.heap.str(s).unwrap(), "kept");
}

#[test]
fn test_gc_interval_during_run() {
    let config = Config::default().with_gc_interval(1);
    let mut vm = Vm::with_config(config, Box::new(StdIo));
    let id = vm.add_module("t");
    let l = vm.modules[id as usize].globals.set("l", Value::Dummy);
    let code = &mut vm.modules[id as usize].code;
    for i in 0..4 {
        op(code, Opcode::PushInt, &[i]);
        op(code, Opcode::MakeList, &[1]);
        op(code, Opcode::Assign, &[CUR, l, 0]);
    }
    op(code, Opcode::PushInt, &[0]);
    op(code, Opcode::PushObj, &[CUR, l, 1]);
    op(code, Opcode::RetResult, &[]);
    assert_eq!(vm.exec_module(id).unwrap(), Value::Int(3));
}

#[test]
fn test_const_strings_survive_gc() {
    let mut vm = Vm::new();
    let ix = vm.heap.consts.intern("literal").index;
    vm.gc();
    assert_eq!(vm.heap.str(StrRef::Const(ix)).unwrap(), "literal");
}

#[test]
fn test_register_external_reuses_entry() {
    use crate::vm::builtins::math::RandInt;

    let mut vm = Vm::new();
    let dice: Rc<dyn ExternalCallable> = Rc::new(RandInt::with_seed(7));
    let a = vm.register_external(Rc::clone(&dice));
    let b = vm.register_external(Rc::clone(&dice));
    assert_eq!(a, b);
    assert_eq!(vm.externals.len(), 1);

    let other = vm.register_external(Rc::new(RandInt::with_seed(7)));
    assert_ne!(other, a);
    assert_eq!(vm.externals.len(), 2);
}
