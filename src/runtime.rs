//! 임베딩 API
//!
//! 호스트 프로그램은 [`Matrix`] 하나로 모듈을 만들고, 스크립트를 실행하고, 값 스택을 통해
//! 스크립트 함수를 호출합니다. 런타임은 `Rc` 플러그인을 들고 있어서 스레드 간에 옮길 수 없습니다.

use std::path::Path;
use std::rc::Rc;

use log::{debug, info};

use crate::MatrixError;
use crate::config::Config;
use crate::runtime_io::{RuntimeIo, StdIo};
use crate::vm::builtins::math::MathModule;
use crate::vm::compiler::compile_module;
use crate::vm::heap::GcStats;
use crate::vm::utils::{display_value, to_int, to_real, to_str};
use crate::vm::value::{ModuleId, NativeFn, StrRef, Value, ValueType};
use crate::vm::{ExternalCallable, NativeModule, Vm, VmErrorKind, disasm, err, image};

pub type MatrixResult<T> = Result<T, MatrixError>;

/// `exec_str` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Done,
    /// 입력이 문장 중간에서 끝남. 더 읽어서 다시 실행해야 함
    Incomplete,
}

pub struct Matrix {
    vm: Vm,
    closed: bool,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::new()
    }
}

impl Matrix {
    pub fn new() -> Self {
        Self::with_config(Config::default(), Box::new(StdIo))
    }

    pub fn with_io(io: Box<dyn RuntimeIo>) -> Self {
        Self::with_config(Config::default(), io)
    }

    pub fn with_config(config: Config, io: Box<dyn RuntimeIo>) -> Self {
        let mut vm = Vm::with_config(config, io);
        vm.register_native_module(Rc::new(MathModule));
        Self { vm, closed: false }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    // ========== 실행 ==========

    /// 파일을 이름이 파일 stem인 모듈로 컴파일만 합니다.
    pub fn compile_file(&mut self, path: impl AsRef<Path>) -> MatrixResult<ModuleId> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| MatrixError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "main".to_string());

        let id = self.vm.add_module(&name);
        self.vm.module_mut(id)?.path = Some(path.to_path_buf());
        compile_module(&mut self.vm, id, &src, &path.display().to_string())?;
        self.vm.module_mut(id)?.init = true;
        Ok(id)
    }

    /// 파일을 컴파일하고 최상위 코드를 실행합니다.
    pub fn exec_file(&mut self, path: impl AsRef<Path>) -> MatrixResult<ModuleId> {
        let path = path.as_ref();
        let id = self.compile_file(path)?;
        info!("executing '{}' as module #{}", path.display(), id);
        self.vm.exec_module(id)?;
        Ok(id)
    }

    pub fn add_module(&mut self, name: &str) -> ModuleId {
        self.vm.add_module(name)
    }

    /// 모듈의 최상위 코드를 `src`로 바꿔서 실행합니다. 함수와 전역은 이전 호출에서 이어집니다.
    pub fn exec_str(&mut self, module: ModuleId, src: &str) -> MatrixResult<ExecStatus> {
        let file = self.vm.module(module)?.file_name();
        match compile_module(&mut self.vm, module, src, &file) {
            Ok(()) => {}
            Err(e) if e.is_incomplete() => {
                debug!("incomplete input for module #{}", module);
                return Ok(ExecStatus::Incomplete);
            }
            Err(e) => return Err(e.into()),
        }
        self.vm.module_mut(module)?.init = true;
        self.vm.exec_module(module)?;
        Ok(ExecStatus::Done)
    }

    pub fn module_global_index(&self, module: ModuleId, name: &str) -> Option<u32> {
        self.vm.module(module).ok()?.globals.index_of(name)
    }

    // ========== 스택 ==========

    pub fn push_module_global(&mut self, module: ModuleId, index: u32) -> MatrixResult<()> {
        let v = self.vm.module(module)?.global(index).ok_or_else(|| {
            err(
                VmErrorKind::InvalidIndex,
                format!("Module #{} has no global slot {}.", module, index),
            )
        })?;
        self.push(v)
    }

    pub fn push(&mut self, v: Value) -> MatrixResult<()> {
        Ok(self.vm.push(v)?)
    }

    pub fn push_none(&mut self) -> MatrixResult<()> {
        self.push(Value::None)
    }

    pub fn push_int(&mut self, i: i32) -> MatrixResult<()> {
        self.push(Value::Int(i))
    }

    pub fn push_float(&mut self, f: f32) -> MatrixResult<()> {
        self.push(Value::Real(f))
    }

    /// 새 문자열을 GC 테이블에 만들어 push
    pub fn push_str(&mut self, s: &str) -> MatrixResult<()> {
        let r = self.vm.heap.new_string(s);
        self.push(Value::Str(r))
    }

    pub fn push_str_obj(&mut self, r: StrRef) -> MatrixResult<()> {
        self.vm.heap.str_obj(r)?;
        self.push(Value::Str(r))
    }

    pub fn push_ext(&mut self, ext: Rc<dyn ExternalCallable>) -> MatrixResult<()> {
        let v = self.vm.register_external(ext);
        self.push(v)
    }

    /// `stack[top-1-argc]`를 `argc`개 인자로 호출. callee와 인자는 스택에서 제거됩니다.
    pub fn call(&mut self, argc: usize) -> MatrixResult<Value> {
        Ok(self.vm.call(argc)?)
    }

    pub fn pop(&mut self, n: usize) -> MatrixResult<()> {
        Ok(self.vm.pop_n(n)?)
    }

    /// pos > 0: 현재 네이티브 호출의 인자, pos < 0: top에서부터
    pub fn stack_value(&self, pos: isize) -> Option<Value> {
        self.vm.stack_value(pos)
    }

    pub fn param_count(&self) -> usize {
        self.vm.param_count()
    }

    // ========== 값 ==========

    pub fn value_type(&self, v: &Value) -> ValueType {
        v.value_type()
    }

    pub fn to_str(&mut self, v: Value) -> MatrixResult<String> {
        let r = to_str(&mut self.vm.heap, v)?;
        Ok(self.vm.heap.str(r)?.to_string())
    }

    pub fn to_int32(&self, v: Value) -> MatrixResult<i32> {
        Ok(to_int(&self.vm.heap, v)?)
    }

    pub fn to_float(&self, v: Value) -> MatrixResult<f32> {
        Ok(to_real(&self.vm.heap, v)?)
    }

    /// 외부 객체 값이면 등록된 객체
    pub fn to_addr(&self, v: Value) -> Option<Rc<dyn ExternalCallable>> {
        match v {
            Value::Ext(r) => self.vm.external(r).cloned(),
            _ => None,
        }
    }

    /// `print`와 같은 형식으로 출력
    pub fn print_value(&mut self, v: Value) {
        let text = display_value(&self.vm, v);
        self.vm.io.write(&text);
    }

    pub fn list_len(&self, v: Value) -> MatrixResult<usize> {
        match v {
            Value::List(h) => Ok(self.vm.heap.list(h)?.items.len()),
            other => Err(err(
                VmErrorKind::TypeError,
                format!("Expected list, got {}.", other.value_type()),
            )
            .into()),
        }
    }

    pub fn list_index(&self, v: Value, index: usize) -> MatrixResult<Value> {
        let Value::List(h) = v else {
            return Err(err(
                VmErrorKind::TypeError,
                format!("Expected list, got {}.", v.value_type()),
            )
            .into());
        };
        let items = &self.vm.heap.list(h)?.items;
        items.get(index).copied().ok_or_else(|| {
            err(
                VmErrorKind::InvalidIndex,
                format!("List index {} out of range ({}).", index, items.len()),
            )
            .into()
        })
    }

    // ========== 등록 ==========

    pub fn reg_func(&mut self, module: ModuleId, name: &str, f: NativeFn) -> MatrixResult<u32> {
        Ok(self.vm.reg_func(module, name, f)?)
    }

    pub fn reg_int(&mut self, module: ModuleId, name: &str, i: i32) -> MatrixResult<u32> {
        Ok(self.vm.reg_int(module, name, i)?)
    }

    pub fn reg_float(&mut self, module: ModuleId, name: &str, f: f32) -> MatrixResult<u32> {
        Ok(self.vm.reg_float(module, name, f)?)
    }

    pub fn reg_str(&mut self, module: ModuleId, name: &str, s: &str) -> MatrixResult<u32> {
        Ok(self.vm.reg_str(module, name, s)?)
    }

    pub fn register_native_module(&mut self, plugin: Rc<dyn NativeModule>) {
        self.vm.register_native_module(plugin);
    }

    // ========== 기타 ==========

    pub fn gc(&mut self) -> GcStats {
        self.vm.gc()
    }

    pub fn disasm(&self, module: ModuleId, mut callback: impl FnMut(&str)) -> MatrixResult<()> {
        Ok(disasm::disassemble(&self.vm, module, &mut callback)?)
    }

    pub fn save_image(&self, module: ModuleId, path: impl AsRef<Path>) -> MatrixResult<()> {
        Ok(image::save(&self.vm, module, path.as_ref())?)
    }

    /// 이미지를 모듈로 설치합니다. 실행은 하지 않습니다.
    pub fn load_image(&mut self, path: impl AsRef<Path>) -> MatrixResult<ModuleId> {
        Ok(image::load(&mut self.vm, path.as_ref())?)
    }

    /// 설치된 모듈의 최상위 코드 실행
    pub fn run_module(&mut self, module: ModuleId) -> MatrixResult<Value> {
        Ok(self.vm.exec_module(module)?)
    }

    /// 로드된 네이티브 모듈을 닫습니다. 두 번째 호출부터는 아무것도 하지 않음
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.vm.close_plugins();
        self.vm.io.flush();
    }
}

impl Drop for Matrix {
    fn drop(&mut self) {
        self.close();
    }
}
