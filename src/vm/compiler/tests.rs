use super::*;
use crate::vm::bytecode::CodeBuffer;
use crate::vm::value::Value;

fn compile(src: &str) -> (Vm, ModuleId) {
    let mut vm = Vm::new();
    let id = vm.add_module("test");
    compile_module(&mut vm, id, src, "test.mat").expect("compile failed");
    (vm, id)
}

fn compile_err(src: &str) -> CompileError {
    let mut vm = Vm::new();
    let id = vm.add_module("test");
    compile_module(&mut vm, id, src, "test.mat").expect_err("compile should fail")
}

fn decode(code: &CodeBuffer) -> Vec<(usize, Opcode, Vec<u32>)> {
    code.decode()
        .map(|d| {
            let d = d.unwrap();
            (d.pos, d.op, d.operands.to_vec())
        })
        .collect()
}

fn ops(code: &CodeBuffer) -> Vec<Opcode> {
    decode(code).into_iter().map(|(_, op, _)| op).collect()
}

fn run(src: &str) -> (Vm, ModuleId) {
    let (mut vm, id) = compile(src);
    vm.exec_module(id).expect("run failed");
    (vm, id)
}

fn global(vm: &Vm, id: ModuleId, name: &str) -> Value {
    *vm.modules[id as usize].globals.get_by_name(name).unwrap()
}

#[test]
fn test_empty_program_exits() {
    let (vm, id) = compile("");
    assert_eq!(ops(&vm.modules[id as usize].code), vec![Opcode::Exit]);
}

#[test]
fn test_assignment_emission() {
    let (vm, id) = compile("x = 1 + 2;");
    let x = vm.modules[id as usize].globals.index_of("x").unwrap();
    assert_eq!(
        decode(&vm.modules[id as usize].code),
        vec![
            (0, Opcode::PushInt, vec![1]),
            (2, Opcode::PushInt, vec![2]),
            (4, Opcode::Add, vec![]),
            (5, Opcode::Assign, vec![u32::MAX, x, 0]),
            (9, Opcode::Exit, vec![]),
        ]
    );
}

#[test]
fn test_module_level_name_reserved_as_dummy() {
    let (vm, id) = compile("y = x;");
    assert_eq!(global(&vm, id, "x"), Value::Dummy);
}

#[test]
fn test_while_break_continue_targets() {
    let (vm, id) = compile("i = 0; while (i < 10) { i += 1; continue; break; }");
    let code = decode(&vm.modules[id as usize].code);
    let jumps: Vec<(Opcode, u32)> = code
        .iter()
        .filter(|(_, op, _)| matches!(op, Opcode::Jmp | Opcode::FalseJmp))
        .map(|(_, op, operands)| (*op, operands[0]))
        .collect();
    // entry 6: 조건식 시작, exit 27: 루프 다음 EXIT
    assert_eq!(
        jumps,
        vec![
            (Opcode::FalseJmp, 27),
            (Opcode::Jmp, 6),
            (Opcode::Jmp, 27),
            (Opcode::Jmp, 6),
        ]
    );
    assert_eq!(code.last().map(|c| (c.0, c.1)), Some((27, Opcode::Exit)));
}

#[test]
fn test_if_elif_else_runs_one_branch() {
    let src = "
        def pick(n) {
            if n == 1 { return \"one\"; }
            elif (n == 2) return \"two\";
            else { return \"many\"; }
        }
        a = pick(1); b = pick(2); c = pick(7);
    ";
    let (vm, id) = run(src);
    for (name, want) in [("a", "one"), ("b", "two"), ("c", "many")] {
        let Value::Str(s) = global(&vm, id, name) else {
            panic!("{} is not a string", name);
        };
        assert_eq!(vm.heap.str(s).unwrap(), want);
    }
}

#[test]
fn test_if_without_else_falls_through() {
    let (vm, id) = run("x = 0; if (none) x = 1; y = 2;");
    assert_eq!(global(&vm, id, "x"), Value::Int(0));
    assert_eq!(global(&vm, id, "y"), Value::Int(2));
}

#[test]
fn test_function_call_from_host() {
    let (mut vm, id) = compile("def add(a, b) { return a + b; }");
    let f = global(&vm, id, "add");
    assert!(matches!(f, Value::Func(_)));
    vm.push(f).unwrap();
    vm.push(Value::Int(3)).unwrap();
    vm.push(Value::Int(4)).unwrap();
    assert_eq!(vm.call(2).unwrap(), Value::Int(7));
    assert!(vm.stack.is_empty());
}

#[test]
fn test_recursion_resolves() {
    let src = "
        def fact(n) {
            if (n <= 1) return 1;
            return n * fact(n - 1);
        }
        r = fact(10);
    ";
    let (vm, id) = run(src);
    assert_eq!(global(&vm, id, "r"), Value::Int(3628800));
}

#[test]
fn test_unknown_name_in_function_is_local() {
    let (vm, id) = compile("def f(a) { t = a; return t; }");
    let f = &vm.modules[id as usize].functions[0];
    assert_eq!(f.arity, 1);
    assert_eq!(f.local_count(), 2);
    assert_eq!(f.locals.index_of("t"), Some(1));
    // ASSIGN -1 -2 0
    assert!(decode(&f.code).iter().any(|(_, op, operands)| *op == Opcode::Assign
        && operands.as_slice() == [u32::MAX, (-2i32) as u32, 0]));
}

#[test]
fn test_list_and_dict_index() {
    let (vm, id) = run("x = [1, 2, 3]; y = x[1]; d = {\"k\": 1}; v = d[\"k\"]; e = [];");
    assert_eq!(global(&vm, id, "y"), Value::Int(2));
    assert_eq!(global(&vm, id, "v"), Value::Int(1));
    let Value::List(e) = global(&vm, id, "e") else {
        panic!("e is not a list");
    };
    assert!(vm.heap.list(e).unwrap().items.is_empty());
}

#[test]
fn test_nested_index_assignment() {
    let (vm, id) = run("m = [[0, 0], [0, 0]]; m[1][0] = 5; v = m[1][0];");
    assert_eq!(global(&vm, id, "v"), Value::Int(5));
}

#[test]
fn test_unary_operators() {
    let (vm, id) = run("a = -3; b = ~0; c = !none; d = ++1; e = --1; f = +4;");
    assert_eq!(global(&vm, id, "a"), Value::Int(-3));
    assert_eq!(global(&vm, id, "b"), Value::Int(-1));
    assert_eq!(global(&vm, id, "c"), Value::Int(1));
    assert_eq!(global(&vm, id, "d"), Value::Int(2));
    assert_eq!(global(&vm, id, "e"), Value::Int(0));
    assert_eq!(global(&vm, id, "f"), Value::Int(4));
}

#[test]
fn test_precedence() {
    let (vm, id) = run("a = 1 + 2 * 3; b = (1 + 2) * 3; c = 1 + 2 == 3;");
    assert_eq!(global(&vm, id, "a"), Value::Int(7));
    assert_eq!(global(&vm, id, "b"), Value::Int(9));
    assert_eq!(global(&vm, id, "c"), Value::Int(1));
}

#[test]
fn test_import_alias_binding() {
    let mut vm = Vm::new();
    vm.register_native_module(std::rc::Rc::new(crate::vm::builtins::math::MathModule));
    let id = vm.add_module("test");
    compile_module(&mut vm, id, "import \"math\" as m; p = m:pi;", "test.mat").unwrap();
    let math = vm.module_id("math").unwrap();
    assert_eq!(
        *vm.modules[id as usize].globals.get_by_name("m").unwrap(),
        Value::Module(math)
    );
    // 멤버 슬롯이 대상 모듈에 예약됨
    assert!(vm.modules[math as usize].globals.index_of("pi").is_some());

    vm.exec_module(id).unwrap();
    assert_eq!(
        *vm.modules[id as usize].globals.get_by_name("p").unwrap(),
        Value::Real(crate::vm::builtins::math::PI)
    );
}

#[test]
fn test_import_default_alias() {
    let (vm, id) = compile("import \"mylib\";");
    let lib = vm.module_id("mylib").unwrap();
    assert_eq!(global(&vm, id, "mylib"), Value::Module(lib));
    assert!(!vm.modules[lib as usize].init);
}

#[test]
fn test_dict_literal_key_is_not_module_member() {
    let (vm, id) = run("k = 1; d = {k: 2}; v = d[1];");
    assert_eq!(global(&vm, id, "v"), Value::Int(2));
}

#[test]
fn test_line_table() {
    let (vm, id) = compile("a = 1;\n\nb = 2;");
    let code = &vm.modules[id as usize].code;
    assert_eq!(code.line_at(0), Some(1));
    let second = decode(code)
        .into_iter()
        .filter(|(_, op, _)| *op == Opcode::PushInt)
        .nth(1)
        .unwrap()
        .0;
    assert_eq!(code.line_at(second), Some(3));
}

// ========== 오류 ==========

#[test]
fn test_duplicate_function() {
    let e = compile_err("def f() { } def f() { }");
    assert_eq!(e.kind, CompileErrorKind::Semantic);
    assert_eq!(
        e.message,
        "The function name \"f\" has been used in another place."
    );
}

#[test]
fn test_builtin_name_cannot_be_redefined() {
    let e = compile_err("def print(x) { }");
    assert_eq!(e.kind, CompileErrorKind::Semantic);
}

#[test]
fn test_misplaced_statements() {
    assert_eq!(
        compile_err("break;").message,
        "Cannot find loop statement to break."
    );
    assert_eq!(
        compile_err("return 1;").message,
        "\"return\" can only be used in function."
    );
    assert_eq!(
        compile_err("def f() { import \"x\"; }").message,
        "\"import\" can only be used in global space."
    );
    assert_eq!(
        compile_err("while (1) { import \"x\"; }").kind,
        CompileErrorKind::Semantic
    );
}

#[test]
fn test_syntax_errors() {
    let e = compile_err("x = ;");
    assert_eq!(e.kind, CompileErrorKind::Syntax);
    assert_eq!(e.message, "Invalid expression.");

    let e = compile_err("x + 1;");
    assert_eq!(e.message, "Expect operator or \"(\".");

    let e = compile_err("x = -\"s\";");
    assert_eq!(e.message, "Invalid unary operator.");

    let e = compile_err("1;");
    assert_eq!(e.message, "Unknown statement.");

    let e = compile_err("f(1 2);");
    assert_eq!(e.message, "Token \"2\" is not expected.");
}

#[test]
fn test_error_line_and_file() {
    let e = compile_err("a = 1;\nb = 2;\nc = );");
    assert_eq!(e.line, 3);
    assert_eq!(e.file, "test.mat");
    assert_eq!(e.to_string(), "test.mat:3: Invalid expression.");
}

#[test]
fn test_lex_error_kind() {
    let e = compile_err("x = \"\\q\";");
    assert_eq!(e.kind, CompileErrorKind::Lex);
}

#[test]
fn test_incomplete_input() {
    assert!(compile_err("if (1) {").is_incomplete());
    assert!(compile_err("x = 1").is_incomplete());
    assert!(compile_err("def f(a,").is_incomplete());
    assert!(compile_err("x = \"abc").is_incomplete());
    assert!(compile_err("/* open").is_incomplete());
    assert!(!compile_err("x = );").is_incomplete());
}

#[test]
fn test_loop_nesting_limit() {
    let deep = "while (1) ".repeat(MAX_LOOP_NEST + 1) + ";";
    let e = compile_err(&deep);
    assert_eq!(e.kind, CompileErrorKind::Semantic);

    let ok = "while (none) ".repeat(MAX_LOOP_NEST) + ";";
    compile(&ok);
}

#[test]
fn test_break_limit() {
    let body = "break; ".repeat(MAX_BREAKS + 1);
    let e = compile_err(&format!("while (1) {{ {} }}", body));
    assert!(e.message.starts_with("There are too many \"break\""));
}

#[test]
fn test_failed_compile_rolls_back() {
    let mut vm = Vm::new();
    let id = vm.add_module("test");
    compile_module(&mut vm, id, "def f() { }", "test.mat").unwrap();
    assert!(compile_module(&mut vm, id, "def g() { x = ; }", "test.mat").is_err());
    let m = &vm.modules[id as usize];
    assert_eq!(m.functions.len(), 1);
    assert!(m.globals.index_of("g").is_none());
    assert!(m.code.is_empty());

    // 같은 정의를 다시 컴파일할 수 있어야 함 (REPL)
    compile_module(&mut vm, id, "def g() { return 1; }", "test.mat").unwrap();
}
