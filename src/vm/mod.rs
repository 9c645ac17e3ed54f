pub mod builtins; // builtin 함수와 math 플러그인
pub mod bytecode;
pub mod compiler;
pub mod disasm; // 디스어셈블러
pub mod hash;
pub mod heap;
pub mod image; // 바이트코드 이미지
pub mod machine; // machine/ 디렉토리
pub mod module;
pub mod native;
pub mod slots;
pub mod utils;
pub mod value;

pub use bytecode::{CodeBuffer, Opcode, OperandKind};
pub use compiler::{CompileError, CompileErrorKind, CompileResult, compile_module};
pub use machine::{Vm, VmError, VmErrorKind, VmResult, VmState, err};
pub use module::{Function, Module, ModuleKind};
pub use native::{ExternalCallable, NativeModule};
pub use value::{ModuleId, NativeFn, Value, ValueType};
