// machine 모듈 - VM 실행 엔진
//
// 이 모듈은 바이트코드를 실행하는 VM을 구현합니다. 값 스택 하나와 별도의 프레임 스택을
// 쓰며, 모듈/함수 코드는 모두 VM이 소유합니다.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info, trace};

use crate::config::Config;
use crate::runtime_io::{RuntimeIo, StdIo};
use crate::vm::bytecode::{CodeBuffer, Opcode};
use crate::vm::heap::{GcStats, Heap};
use crate::vm::module::{BUILTINS_ID, BUILTINS_MODULE, Function, Module, ModuleKind};
use crate::vm::native::{ExternalCallable, NativeModule};
use crate::vm::slots::SlotTable;
use crate::vm::value::{ExtRef, FuncRef, ModuleId, NativeFn, Value};

// 서브모듈
mod address;
mod arith;
mod instruction;

#[cfg(test)]
mod tests;

pub use instruction::ExecutionFlow;

// ========== 타입 정의 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VmErrorKind {
    #[error("type error")]
    TypeError,
    #[error("division by zero")]
    ZeroDivision,
    #[error("not callable")]
    NotCallable,
    #[error("not indexable")]
    NotIndexable,
    #[error("invalid index")]
    InvalidIndex,
    #[error("invalid module")]
    InvalidModule,
    #[error("unhashable key")]
    Unhashable,
    #[error("undefined variable")]
    Undefined,
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("frame overflow")]
    FrameOverflow,
    #[error("dangling handle")]
    DanglingHandle,
    #[error("unknown opcode")]
    UnknownOpcode,
    #[error("native error")]
    Native,
    #[error("load error")]
    Load,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
    /// 실패한 명령어가 속한 모듈의 파일 이름
    pub file: Option<String>,
    /// 디버그 줄 테이블로 찾은 소스 줄
    pub line: Option<u32>,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: {}", file, line, self.message),
            (Some(file), None) => write!(f, "{}: {}", file, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for VmError {}

pub type VmResult<T> = Result<T, VmError>;

/// VM execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Idle,
    Running,
    Finished,
    Error,
}

/// 프레임이 실행 중인 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeRef {
    Module(ModuleId),
    Function(FuncRef),
}

impl CodeRef {
    pub fn module(self) -> ModuleId {
        match self {
            CodeRef::Module(m) => m,
            CodeRef::Function(f) => f.module,
        }
    }
}

/// 프레임이 끝났을 때 돌아갈 곳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnTarget {
    /// 임베딩 API로 값을 돌려줌
    Host,
    /// 호출한 프레임의 저장된 ip에서 계속
    Caller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub code: CodeRef,
    pub ip: usize,
    /// 첫 번째 인자의 스택 위치 (callee 슬롯 바로 다음)
    pub base: usize,
    pub argc: usize,
    pub ret: ReturnTarget,
}

pub struct Vm {
    pub stack: Vec<Value>,
    pub frames: Vec<Frame>,
    pub heap: Heap,
    pub modules: Vec<Module>,
    pub module_names: SlotTable<ModuleId>,
    plugins: Vec<Rc<dyn NativeModule>>,
    externals: Vec<Rc<dyn ExternalCallable>>,
    pub config: Config,
    pub io: Box<dyn RuntimeIo>,
    /// 현재 네이티브 호출의 인자 위치
    arg_base: usize,
    arg_count: usize,
    started: instant::Instant,
    dispatched: u64,
    pub max_stack: usize,
    pub max_frames: usize,
    pub state: VmState,
}

// ========== 유틸리티 함수 ==========

/// VmError 생성 헬퍼 함수
pub fn err(kind: VmErrorKind, message: impl Into<String>) -> VmError {
    VmError {
        kind,
        message: message.into(),
        file: None,
        line: None,
    }
}

// ========== VM 구현 ==========

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(Config::default(), Box::new(StdIo))
    }

    pub fn with_config(config: Config, io: Box<dyn RuntimeIo>) -> Self {
        let mut vm = Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(32),
            heap: Heap::new(),
            modules: Vec::new(),
            module_names: SlotTable::new(),
            plugins: Vec::new(),
            externals: Vec::new(),
            max_stack: config.max_stack,
            max_frames: config.max_frames,
            config,
            io,
            arg_base: 0,
            arg_count: 0,
            started: instant::Instant::now(),
            dispatched: 0,
            state: VmState::Idle,
        };

        let mut builtins = Module::new(BUILTINS_MODULE);
        builtins.init = true;
        for b in crate::builtins::all() {
            builtins.globals.set(b.name, Value::Native(b.func));
        }
        vm.modules.push(builtins);
        vm.module_names.set(BUILTINS_MODULE, BUILTINS_ID);
        vm
    }

    pub fn get_state(&self) -> VmState {
        self.state
    }

    /// 런타임 생성 이후 경과 시간 (밀리초)
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    // ========== 스택 연산 ==========

    pub fn push(&mut self, v: Value) -> VmResult<()> {
        if self.stack.len() >= self.max_stack {
            return Err(err(VmErrorKind::StackOverflow, "Stack overflow."));
        }
        self.stack.push(v);
        Ok(())
    }

    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "Stack underflow."))
    }

    pub fn pop_n(&mut self, n: usize) -> VmResult<()> {
        let len = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "Stack underflow."))?;
        self.stack.truncate(len);
        Ok(())
    }

    /// 위에서 `depth`번째 값 (0: top)
    pub fn peek(&self, depth: usize) -> VmResult<Value> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|i| self.stack[i])
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "Stack underflow."))
    }

    /// pos > 0: 현재 네이티브 호출의 `pos`번째 인자, pos < 0: top에서부터
    pub fn stack_value(&self, pos: isize) -> Option<Value> {
        if pos > 0 {
            let i = pos as usize;
            (i <= self.arg_count).then(|| self.stack.get(self.arg_base + i - 1).copied())?
        } else if pos < 0 {
            let back = pos.unsigned_abs();
            self.stack
                .len()
                .checked_sub(back)
                .and_then(|i| self.stack.get(i).copied())
        } else {
            None
        }
    }

    /// 네이티브 함수 인자 (1부터). 범위를 벗어나면 none
    pub fn arg(&self, i: usize) -> Value {
        if i == 0 {
            return Value::None;
        }
        self.stack_value(i as isize).unwrap_or(Value::None)
    }

    pub fn param_count(&self) -> usize {
        self.arg_count
    }

    // ========== 모듈 ==========

    /// 이미 있는 이름이면 기존 id를 돌려줍니다.
    pub fn add_module(&mut self, name: &str) -> ModuleId {
        if let Some(&id) = self.module_names.get_by_name(name) {
            return id;
        }
        let mut module = Module::new(name);
        for (n, v) in self.modules[BUILTINS_ID as usize].globals.iter() {
            module.globals.set(n, *v);
        }
        let id = self.modules.len() as ModuleId;
        self.modules.push(module);
        self.module_names.set(name, id);
        debug!("module '{}' registered as #{}", name, id);
        id
    }

    pub fn module(&self, id: ModuleId) -> VmResult<&Module> {
        self.modules.get(id as usize).ok_or_else(|| {
            err(
                VmErrorKind::InvalidModule,
                format!("Invalid module id {}.", id),
            )
        })
    }

    pub fn module_mut(&mut self, id: ModuleId) -> VmResult<&mut Module> {
        self.modules.get_mut(id as usize).ok_or_else(|| {
            err(
                VmErrorKind::InvalidModule,
                format!("Invalid module id {}.", id),
            )
        })
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.module_names.get_by_name(name).copied()
    }

    pub fn function(&self, f: FuncRef) -> VmResult<&Function> {
        self.module(f.module)?
            .functions
            .get(f.index as usize)
            .ok_or_else(|| err(VmErrorKind::NotCallable, "The object is not callable."))
    }

    pub(crate) fn code(&self, code: CodeRef) -> VmResult<&CodeBuffer> {
        match code {
            CodeRef::Module(m) => Ok(&self.module(m)?.code),
            CodeRef::Function(f) => Ok(&self.function(f)?.code),
        }
    }

    fn find_module_file(&self, name: &str) -> Option<PathBuf> {
        let file = format!("{}.mat", name);
        self.config
            .search_paths
            .iter()
            .map(|dir| dir.join(&file))
            .find(|p| p.is_file())
    }

    /// 모듈 본문을 준비합니다. 실행할 최상위 코드가 생기면 true
    pub fn load_module(&mut self, id: ModuleId) -> VmResult<bool> {
        let name = self.module(id)?.name.to_string();
        if let Some(plugin) = self.plugins.iter().position(|p| p.name() == name) {
            let p = Rc::clone(&self.plugins[plugin]);
            {
                let module = self.module_mut(id)?;
                module.kind = ModuleKind::Native { plugin };
                module.init = true;
            }
            info!("importing native module '{}'", name);
            p.import(self, id)?;
            return Ok(false);
        }

        let path = self.find_module_file(&name).ok_or_else(|| {
            err(
                VmErrorKind::Load,
                format!("Cannot find module '{}'.", name),
            )
        })?;
        info!("loading module '{}' from {}", name, path.display());
        self.compile_file(id, &path)?;
        Ok(true)
    }

    /// 파일을 읽어 모듈 `id`의 최상위 코드로 컴파일하고 init 표시
    pub fn compile_file(&mut self, id: ModuleId, path: &Path) -> VmResult<()> {
        let src = std::fs::read_to_string(path).map_err(|e| {
            err(
                VmErrorKind::Load,
                format!("Cannot read '{}': {}", path.display(), e),
            )
        })?;
        self.module_mut(id)?.path = Some(path.to_path_buf());
        let file = path.display().to_string();
        crate::vm::compiler::compile_module(self, id, &src, &file)
            .map_err(|e| err(VmErrorKind::Load, e.to_string()))?;
        self.module_mut(id)?.init = true;
        Ok(())
    }

    // ========== 실행 ==========

    /// 모듈 최상위 코드를 처음부터 실행
    pub fn exec_module(&mut self, id: ModuleId) -> VmResult<Value> {
        let base = self.stack.len();
        self.enter(Frame {
            code: CodeRef::Module(id),
            ip: 0,
            base,
            argc: 0,
            ret: ReturnTarget::Host,
        })?;
        self.run_guarded(base)
    }

    /// `stack[top-1-argc]`를 호출하고 결과를 돌려줍니다. callee와 인자는 스택에서 제거됨
    pub fn call(&mut self, argc: usize) -> VmResult<Value> {
        let callee_pos = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "Stack underflow."))?;
        let callee = self.stack[callee_pos];
        let result = match callee {
            Value::Func(f) => match self.enter_function(f, callee_pos, argc, ReturnTarget::Host) {
                Ok(()) => self.run_guarded(callee_pos),
                Err(e) => Err(e),
            },
            other => self.call_native_value(other, callee_pos, argc),
        };
        self.stack.truncate(callee_pos);
        result
    }

    fn enter(&mut self, frame: Frame) -> VmResult<()> {
        if self.frames.len() >= self.max_frames {
            return Err(err(VmErrorKind::FrameOverflow, "Too many nested calls."));
        }
        self.frames.push(frame);
        Ok(())
    }

    /// 인자를 arity에 맞추고 지역 변수 슬롯을 예약한 뒤 프레임을 엽니다.
    pub(crate) fn enter_function(
        &mut self,
        f: FuncRef,
        callee_pos: usize,
        argc: usize,
        ret: ReturnTarget,
    ) -> VmResult<()> {
        let (arity, locals) = {
            let func = self.function(f)?;
            (func.arity as usize, func.local_count())
        };
        let base = callee_pos + 1;
        if argc > arity {
            self.stack.truncate(base + arity);
        } else {
            for _ in argc..arity {
                self.push(Value::None)?;
            }
        }
        for _ in arity..locals {
            self.push(Value::Uninit)?;
        }
        self.enter(Frame {
            code: CodeRef::Function(f),
            ip: 0,
            base,
            argc,
            ret,
        })
    }

    /// 네이티브/외부 호출. 결과는 호출자가 callee 슬롯에 둡니다.
    pub(crate) fn call_native_value(
        &mut self,
        callee: Value,
        callee_pos: usize,
        argc: usize,
    ) -> VmResult<Value> {
        match callee {
            Value::Native(f) => self.with_args(callee_pos + 1, argc, f),
            Value::Ext(ExtRef(ix)) => {
                let ext = self.externals.get(ix as usize).cloned().ok_or_else(|| {
                    err(VmErrorKind::NotCallable, "The object is not callable.")
                })?;
                self.with_args(callee_pos + 1, argc, |vm| ext.call(vm))
            }
            _ => Err(err(VmErrorKind::NotCallable, "The object is not callable.")),
        }
    }

    fn with_args(
        &mut self,
        base: usize,
        count: usize,
        f: impl FnOnce(&mut Vm) -> VmResult<Value>,
    ) -> VmResult<Value> {
        let saved = (self.arg_base, self.arg_count);
        self.arg_base = base;
        self.arg_count = count;
        let result = f(self);
        (self.arg_base, self.arg_count) = saved;
        result
    }

    /// 방금 연 프레임을 실행. 오류가 나면 프레임과 스택을 진입 시점으로 되돌립니다.
    fn run_guarded(&mut self, stack_floor: usize) -> VmResult<Value> {
        let floor = self.frames.len().saturating_sub(1);
        match self.run(floor) {
            Ok(v) => {
                self.state = VmState::Finished;
                Ok(v)
            }
            Err(e) => {
                let e = self.locate(e);
                self.frames.truncate(floor);
                self.stack.truncate(stack_floor);
                self.state = VmState::Error;
                Err(e)
            }
        }
    }

    fn run(&mut self, floor: usize) -> VmResult<Value> {
        self.state = VmState::Running;
        while self.frames.len() > floor {
            let (op, operands) = self.fetch()?;
            if self.config.trace {
                trace!("{:?} {} {:?}", self.frames.last().map(|f| f.ip), op, operands);
            }
            if let ExecutionFlow::Return(v) = self.execute_instruction(op, operands)? {
                if self.frames.len() <= floor {
                    return Ok(v);
                }
            }
            if let Some(n) = self.config.gc_interval {
                self.dispatched += 1;
                if n > 0 && self.dispatched % n == 0 {
                    self.gc();
                }
            }
        }
        Ok(Value::None)
    }

    /// 현재 프레임에서 명령어 하나를 읽고 ip를 넘깁니다.
    fn fetch(&mut self) -> VmResult<(Opcode, [u32; 3])> {
        let frame = *self
            .frames
            .last()
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "No active frame."))?;
        let code = self.code(frame.code)?;
        let Some(&word) = code.words.get(frame.ip) else {
            // 코드 끝에 도달하면 암묵적으로 종료
            let op = match frame.code {
                CodeRef::Module(_) => Opcode::Exit,
                CodeRef::Function(_) => Opcode::Ret,
            };
            return Ok((op, [0; 3]));
        };
        let op = Opcode::from_word(word)?;
        let n = op.operands().len();
        let mut operands = [0u32; 3];
        let slice = code.words.get(frame.ip + 1..frame.ip + 1 + n).ok_or_else(|| {
            err(
                VmErrorKind::UnknownOpcode,
                format!("Truncated {} at {}.", op, frame.ip),
            )
        })?;
        operands[..n].copy_from_slice(slice);
        if let Some(f) = self.frames.last_mut() {
            f.ip += 1 + n;
        }
        Ok((op, operands))
    }

    /// 현재 프레임의 파일/줄 정보를 오류에 붙입니다.
    fn locate(&self, mut e: VmError) -> VmError {
        if e.file.is_some() {
            return e;
        }
        let Some(frame) = self.frames.last() else {
            return e;
        };
        if let Ok(module) = self.module(frame.code.module()) {
            e.file = Some(module.file_name());
        }
        if let Ok(code) = self.code(frame.code) {
            e.line = code.line_at(frame.ip.saturating_sub(1));
        }
        e
    }

    // ========== GC ==========

    /// 스택과 모든 모듈 전역을 루트로 한 번 수집
    pub fn gc(&mut self) -> GcStats {
        let roots = self
            .stack
            .iter()
            .copied()
            .chain(self.modules.iter().flat_map(|m| m.globals.values().copied()));
        self.heap.collect(roots)
    }

    // ========== 등록 ==========

    pub fn reg_value(&mut self, module: ModuleId, name: &str, v: Value) -> VmResult<u32> {
        Ok(self.module_mut(module)?.globals.set(name, v))
    }

    pub fn reg_func(&mut self, module: ModuleId, name: &str, f: NativeFn) -> VmResult<u32> {
        self.reg_value(module, name, Value::Native(f))
    }

    pub fn reg_int(&mut self, module: ModuleId, name: &str, i: i32) -> VmResult<u32> {
        self.reg_value(module, name, Value::Int(i))
    }

    pub fn reg_float(&mut self, module: ModuleId, name: &str, f: f32) -> VmResult<u32> {
        self.reg_value(module, name, Value::Real(f))
    }

    /// 문자열은 영구 테이블에 들어갑니다.
    pub fn reg_str(&mut self, module: ModuleId, name: &str, s: &str) -> VmResult<u32> {
        let r = self.heap.intern_const(s);
        self.reg_value(module, name, Value::Str(r))
    }

    /// 같은 객체는 한 번만 등록되고 기존 `ExtRef`를 재사용합니다.
    pub fn register_external(&mut self, ext: Rc<dyn ExternalCallable>) -> Value {
        if let Some(ix) = self.externals.iter().position(|e| Rc::ptr_eq(e, &ext)) {
            return Value::Ext(ExtRef(ix as u32));
        }
        debug!("external callable '{}' registered", ext.name());
        self.externals.push(ext);
        Value::Ext(ExtRef((self.externals.len() - 1) as u32))
    }

    pub fn external(&self, r: ExtRef) -> Option<&Rc<dyn ExternalCallable>> {
        self.externals.get(r.0 as usize)
    }

    pub fn register_native_module(&mut self, plugin: Rc<dyn NativeModule>) {
        info!("native module '{}' registered", plugin.name());
        self.plugins.push(plugin);
    }

    /// 로드된 모든 네이티브 모듈의 `close` 호출
    pub fn close_plugins(&mut self) {
        let loaded: Vec<(usize, ModuleId)> = self
            .modules
            .iter()
            .enumerate()
            .filter_map(|(id, m)| match m.kind {
                ModuleKind::Native { plugin } if m.init => Some((plugin, id as ModuleId)),
                _ => None,
            })
            .collect();
        for (plugin, id) in loaded {
            if let Some(p) = self.plugins.get(plugin).cloned() {
                debug!("closing native module '{}'", p.name());
                p.close(self, id);
            }
            if let Some(m) = self.modules.get_mut(id as usize) {
                m.init = false;
            }
        }
    }
}
