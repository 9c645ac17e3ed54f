use super::bytecode::{CodeBuffer, Decoded, Opcode, OperandKind};
use super::machine::{Vm, VmResult};
use super::module::Function;
use super::value::ModuleId;

const SPLITTER: &str = "----------------------------------------";

/// 모듈을 한 줄씩 `out`으로 내보냅니다.
pub fn disassemble(vm: &Vm, module: ModuleId, out: &mut dyn FnMut(&str)) -> VmResult<()> {
    let m = vm.module(module)?;

    out(SPLITTER);
    out(&format!("module: {}", m.name));
    out(&format!("obj count: {}", m.globals.len()));
    out(SPLITTER);
    for (i, (name, v)) in m.globals.iter().enumerate() {
        out(&format!("{}: {} {}", i, name, v.value_type()));
    }
    out(SPLITTER);
    disassemble_code(vm, &m.code, out)?;

    for f in &m.functions {
        disassemble_function(vm, f, out)?;
    }
    Ok(())
}

pub fn disassemble_to_string(vm: &Vm, module: ModuleId) -> VmResult<String> {
    let mut output = String::new();
    disassemble(vm, module, &mut |line| {
        output.push_str(line);
        output.push('\n');
    })?;
    Ok(output)
}

fn disassemble_function(vm: &Vm, f: &Function, out: &mut dyn FnMut(&str)) -> VmResult<()> {
    out(SPLITTER);
    out(&format!("function: {}", f.name));
    out(&format!("param num: {}", f.arity));
    out(SPLITTER);
    for (i, (name, _)) in f.locals.iter().enumerate() {
        let kind = if (i as u32) < f.arity { "param" } else { "local" };
        out(&format!("{}: {} {}", i, name, kind));
    }
    out(SPLITTER);
    disassemble_code(vm, &f.code, out)
}

fn disassemble_code(vm: &Vm, code: &CodeBuffer, out: &mut dyn FnMut(&str)) -> VmResult<()> {
    for ins in code.decode() {
        out(&format_instruction(vm, &ins?)?);
    }
    Ok(())
}

/// `<pos> <OPNAME> <operands>`
pub fn format_instruction(vm: &Vm, ins: &Decoded<'_>) -> VmResult<String> {
    let mut line = format!("{} {}", ins.pos, ins.op);
    for (kind, &word) in ins.op.operands().iter().zip(ins.operands) {
        let text = if kind.contains(OperandKind::STRING) {
            let s = vm.heap.const_str(word)?;
            if ins.op == Opcode::Import {
                format!("\"{}\"({})", s, word)
            } else {
                format!("{:?}", s)
            }
        } else if kind.contains(OperandKind::REAL) {
            format!("{:.6}", f32::from_bits(word))
        } else if kind.intersects(OperandKind::SIGNED | OperandKind::MODULE | OperandKind::SLOT) {
            (word as i32).to_string()
        } else {
            word.to_string()
        };
        line.push(' ');
        line.push_str(&text);
    }
    Ok(line)
}
