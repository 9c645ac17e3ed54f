use super::arith::compound_op;
use super::{Vm, VmErrorKind, VmResult, err};
use crate::vm::bytecode::Opcode;
use crate::vm::value::{Key, Value};

/// 명령어 실행 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionFlow {
    /// 다음 명령어 계속 실행
    Continue,
    /// Host 프레임이 끝남 (임베딩 API로 값 반환)
    Return(Value),
}

impl Vm {
    /// 단일 명령어 실행 (디스패처)
    pub(super) fn execute_instruction(
        &mut self,
        op: Opcode,
        operands: [u32; 3],
    ) -> VmResult<ExecutionFlow> {
        use Opcode as I;
        let [a, b, c] = operands;
        match op {
            I::Nop => Ok(ExecutionFlow::Continue),
            I::Exit => self.handle_return(Value::None),
            I::Import => self.handle_import(a),

            // ===== 상수 =====
            I::PushNone => self.handle_push(Value::None),
            I::PushString => self.handle_push_string(a),
            I::PushInt => self.handle_push(Value::Int(a as i32)),
            I::PushReal => self.handle_push(Value::Real(f32::from_bits(a))),
            I::Pop => self.handle_pop(),

            // ===== 주소 지정 =====
            I::RefObj => self.handle_ref_obj(a as i32, b as i32, c as usize),
            I::PushObj => self.handle_push_obj(a as i32, b as i32, c as usize),
            I::Assign => self.handle_assign(a as i32, b as i32, c as usize),
            I::AssignAdd
            | I::AssignSub
            | I::AssignMul
            | I::AssignDiv
            | I::AssignMod
            | I::AssignExp
            | I::AssignAnd
            | I::AssignOr
            | I::AssignXor
            | I::AssignShl
            | I::AssignShr => self.handle_compound_assign(op, a as i32, b as i32, c as usize),

            // ===== 제어 흐름 =====
            I::FalseJmp => self.handle_cond_jump(a, false),
            I::TrueJmp => self.handle_cond_jump(a, true),
            I::Jmp => self.handle_jump(a),

            // ===== 단항 연산 =====
            I::Minus | I::Inc | I::Dec | I::Lnot | I::Bnot => self.handle_unary(op),

            // ===== 이항 연산 =====
            I::Add
            | I::Sub
            | I::Mul
            | I::Div
            | I::Mod
            | I::Exp
            | I::Bxor
            | I::Bor
            | I::Band
            | I::Shl
            | I::Shr
            | I::Lor
            | I::Land
            | I::Neq
            | I::Eq
            | I::Ge
            | I::Le
            | I::Gt
            | I::Lt => self.handle_binary(op),

            // ===== 호출 =====
            I::Call => self.handle_call(a as usize),
            I::Ret => self.handle_return(Value::None),
            I::RetResult => {
                let v = self.pop()?;
                self.handle_return(v)
            }

            // ===== 컬렉션 =====
            I::MakeList => self.handle_make_list(a as usize),
            I::MakeDict => self.handle_make_dict(a as usize),
        }
    }

    // ==================== 상수 핸들러 ====================

    fn handle_push(&mut self, v: Value) -> VmResult<ExecutionFlow> {
        self.push(v)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_push_string(&mut self, ix: u32) -> VmResult<ExecutionFlow> {
        if self.heap.consts.get_index(ix).is_none() {
            return Err(err(
                VmErrorKind::InvalidIndex,
                format!("Get string from string table failed. Index is {}.", ix),
            ));
        }
        self.push(Value::Str(crate::vm::value::StrRef::Const(ix)))?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_pop(&mut self) -> VmResult<ExecutionFlow> {
        self.pop()?;
        Ok(ExecutionFlow::Continue)
    }

    // ==================== 주소 지정 핸들러 ====================

    fn handle_ref_obj(&mut self, m: i32, id: i32, n: usize) -> VmResult<ExecutionFlow> {
        let place = self.resolve_place(m, id, n, 0, false)?;
        self.pop_n(n)?;
        self.push(Value::Ref(place))?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_push_obj(&mut self, m: i32, id: i32, n: usize) -> VmResult<ExecutionFlow> {
        let place = self.resolve_place(m, id, n, 0, false)?;
        let v = self.read_place(place)?;
        if !v.is_defined() {
            return Err(err(
                VmErrorKind::Undefined,
                format!("The variable \"{}\" is not defined.", self.slot_name(m, id)),
            ));
        }
        self.pop_n(n)?;
        self.push(v)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_assign(&mut self, m: i32, id: i32, n: usize) -> VmResult<ExecutionFlow> {
        let place = self.resolve_place(m, id, n, 1, true)?;
        let v = self.pop()?;
        self.pop_n(n)?;
        self.write_place(place, v)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_compound_assign(
        &mut self,
        op: Opcode,
        m: i32,
        id: i32,
        n: usize,
    ) -> VmResult<ExecutionFlow> {
        let bin = compound_op(op).ok_or_else(|| {
            err(
                VmErrorKind::UnknownOpcode,
                format!("{} is not an assignment.", op),
            )
        })?;
        let place = self.resolve_place(m, id, n, 1, false)?;
        let old = self.read_place(place)?;
        if !old.is_defined() {
            return Err(err(
                VmErrorKind::Undefined,
                format!("The variable \"{}\" is not defined.", self.slot_name(m, id)),
            ));
        }
        let rhs = self.pop()?;
        self.pop_n(n)?;
        let v = self.binary_op(bin, old, rhs)?;
        self.write_place(place, v)?;
        Ok(ExecutionFlow::Continue)
    }

    // ==================== 제어 흐름 핸들러 ====================

    fn handle_jump(&mut self, target: u32) -> VmResult<ExecutionFlow> {
        if let Some(f) = self.frames.last_mut() {
            f.ip = target as usize;
        }
        Ok(ExecutionFlow::Continue)
    }

    /// `when_truthy`: TRUE_JMP, 아니면 FALSE_JMP
    fn handle_cond_jump(&mut self, target: u32, when_truthy: bool) -> VmResult<ExecutionFlow> {
        let v = self.pop()?;
        if v.is_truthy() == when_truthy {
            self.handle_jump(target)
        } else {
            Ok(ExecutionFlow::Continue)
        }
    }

    // ==================== 연산 핸들러 ====================

    fn handle_unary(&mut self, op: Opcode) -> VmResult<ExecutionFlow> {
        let v = self.pop()?;
        let r = self.unary_op(op, v)?;
        self.push(r)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_binary(&mut self, op: Opcode) -> VmResult<ExecutionFlow> {
        let b = self.pop()?;
        let a = self.pop()?;
        let r = self.binary_op(op, a, b)?;
        self.push(r)?;
        Ok(ExecutionFlow::Continue)
    }

    // ==================== 호출 핸들러 ====================

    fn handle_call(&mut self, argc: usize) -> VmResult<ExecutionFlow> {
        let callee_pos = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "Stack underflow."))?;
        let callee = self.stack[callee_pos];
        match callee {
            Value::Func(f) => {
                self.enter_function(f, callee_pos, argc, super::ReturnTarget::Caller)?;
            }
            other => {
                let r = self.call_native_value(other, callee_pos, argc)?;
                self.stack.truncate(callee_pos);
                self.push(r)?;
            }
        }
        Ok(ExecutionFlow::Continue)
    }

    /// 프레임을 닫습니다. 함수 프레임은 callee 슬롯을 결과로 덮어씁니다.
    fn handle_return(&mut self, result: Value) -> VmResult<ExecutionFlow> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "No frame to return from."))?;
        match frame.code {
            super::CodeRef::Function(_) => {
                self.stack.truncate(frame.base.saturating_sub(1));
                self.push(result)?;
            }
            super::CodeRef::Module(_) => self.stack.truncate(frame.base),
        }
        Ok(match frame.ret {
            super::ReturnTarget::Host => ExecutionFlow::Return(result),
            super::ReturnTarget::Caller => ExecutionFlow::Continue,
        })
    }

    fn handle_import(&mut self, name_ix: u32) -> VmResult<ExecutionFlow> {
        let name = self.heap.const_str(name_ix)?.to_string();
        let id = self.add_module(&name);
        if self.module(id)?.init {
            log::debug!("import '{}' skipped (already initialised)", name);
            return Ok(ExecutionFlow::Continue);
        }
        if self.load_module(id)? {
            let base = self.stack.len();
            self.enter(super::Frame {
                code: super::CodeRef::Module(id),
                ip: 0,
                base,
                argc: 0,
                ret: super::ReturnTarget::Caller,
            })?;
        }
        Ok(ExecutionFlow::Continue)
    }

    // ==================== 컬렉션 핸들러 ====================

    fn handle_make_list(&mut self, n: usize) -> VmResult<ExecutionFlow> {
        let start = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "Stack underflow."))?;
        let items = self.stack.split_off(start);
        let h = self.heap.alloc_list(items);
        self.push(Value::List(h))?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_make_dict(&mut self, n: usize) -> VmResult<ExecutionFlow> {
        let start = self
            .stack
            .len()
            .checked_sub(n * 2)
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "Stack underflow."))?;
        let h = self.heap.alloc_dict(n);
        for i in 0..n {
            let k = self.stack[start + i * 2];
            let v = self.stack[start + i * 2 + 1];
            let key: Key = self.heap.key_of(k).map_err(|_| {
                err(
                    VmErrorKind::Unhashable,
                    format!("Make dict failed. {} {}", k.value_type(), v.value_type()),
                )
            })?;
            self.heap.dict_set(h, key, v)?;
        }
        self.stack.truncate(start);
        self.push(Value::Dict(h))?;
        Ok(ExecutionFlow::Continue)
    }
}
