//! 컴파일된 모듈의 바이트코드 이미지
//!
//! 문자열 피연산자(`PUSH_STRING`, `IMPORT`)는 런타임마다 영구 테이블 인덱스가 다르므로
//! 저장할 때 이미지 자체의 문자열 목록 인덱스로 바꾸고, 읽을 때 다시 인터닝해서 되돌립니다.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::bytecode::{CodeBuffer, OperandKind};
use super::machine::{Vm, VmError};
use super::module::{Function, ModuleKind};
use super::slots::SlotTable;
use super::value::{FuncRef, ModuleId, Value};

const IMAGE_MAGIC: u32 = 0x4D53_4C31;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("cannot read or write image: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode image: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("cannot decode image: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("invalid image: {0}")]
    Invalid(String),
    #[error(transparent)]
    Vm(#[from] VmError),
}

pub type ImageResult<T> = Result<T, ImageError>;

/// 전역 슬롯의 컴파일 시점 종류
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalKind {
    Dummy,
    Function(u32),
    Module(String),
    /// 실행 전에 이미 채워진 builtin/호스트 값. 읽을 때 현재 값을 유지
    Host,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionImage {
    pub name: String,
    pub arity: u32,
    pub locals: Vec<String>,
    pub code: CodeBuffer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleImage {
    magic: u32,
    pub name: String,
    pub code: CodeBuffer,
    pub functions: Vec<FunctionImage>,
    pub globals: Vec<(String, GlobalKind)>,
    pub strings: Vec<String>,
}

/// 코드 안의 문자열 피연산자를 모두 `f`로 바꿉니다.
fn remap_strings(
    code: &mut CodeBuffer,
    mut f: impl FnMut(u32) -> ImageResult<u32>,
) -> ImageResult<()> {
    let mut positions = Vec::new();
    for ins in code.decode() {
        let ins = ins?;
        for (k, kind) in ins.op.operands().iter().enumerate() {
            if kind.contains(OperandKind::STRING) {
                positions.push(ins.pos + 1 + k);
            }
        }
    }
    for at in positions {
        let word = code.words[at];
        code.words[at] = f(word)?;
    }
    Ok(())
}

/// 런타임의 영구 문자열 인덱스 → 이미지 문자열 목록 인덱스
struct StringCollector<'a> {
    vm: &'a Vm,
    strings: Vec<String>,
    seen: SlotTable<u32>,
}

impl StringCollector<'_> {
    fn localize(&mut self, index: u32) -> ImageResult<u32> {
        let s = self.vm.heap.const_str(index)?;
        if let Some(&local) = self.seen.get_by_name(s) {
            return Ok(local);
        }
        let local = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.seen.set(s, local);
        Ok(local)
    }
}

pub fn capture(vm: &Vm, module: ModuleId) -> ImageResult<ModuleImage> {
    let m = vm.module(module)?;
    if m.kind != ModuleKind::Script {
        return Err(ImageError::Invalid(format!(
            "module '{}' is a native module",
            m.name
        )));
    }

    let mut collector = StringCollector {
        vm,
        strings: Vec::new(),
        seen: SlotTable::new(),
    };

    let mut code = m.code.clone();
    remap_strings(&mut code, |ix| collector.localize(ix))?;

    let mut functions = Vec::with_capacity(m.functions.len());
    for f in &m.functions {
        let mut fcode = f.code.clone();
        remap_strings(&mut fcode, |ix| collector.localize(ix))?;
        functions.push(FunctionImage {
            name: f.name.to_string(),
            arity: f.arity,
            locals: f.locals.iter().map(|(n, _)| n.to_string()).collect(),
            code: fcode,
        });
    }

    let mut globals = Vec::with_capacity(m.globals.len());
    for (name, v) in m.globals.iter() {
        let kind = match v {
            Value::Func(f) if f.module == module => GlobalKind::Function(f.index),
            Value::Module(id) => GlobalKind::Module(vm.module(*id)?.name.to_string()),
            Value::Dummy => GlobalKind::Dummy,
            _ => GlobalKind::Host,
        };
        globals.push((name.to_string(), kind));
    }

    Ok(ModuleImage {
        magic: IMAGE_MAGIC,
        name: m.name.to_string(),
        code,
        functions,
        globals,
        strings: collector.strings,
    })
}

/// 이미지를 모듈로 설치합니다. 같은 이름의 모듈이 있으면 내용을 덮어씁니다.
pub fn install(vm: &mut Vm, image: &ModuleImage) -> ImageResult<ModuleId> {
    if image.magic != IMAGE_MAGIC {
        return Err(ImageError::Invalid("bad magic number".to_string()));
    }

    let consts: Vec<u32> = image
        .strings
        .iter()
        .map(|s| vm.heap.consts.intern(s).index)
        .collect();
    let relocate = |ix: u32| {
        consts.get(ix as usize).copied().ok_or_else(|| {
            ImageError::Invalid(format!("string index {} out of range", ix))
        })
    };

    let mut code = image.code.clone();
    remap_strings(&mut code, relocate)?;

    let mut functions = Vec::with_capacity(image.functions.len());
    for f in &image.functions {
        let mut func = Function::new(&f.name);
        func.arity = f.arity;
        for local in &f.locals {
            func.locals.set(local, ());
        }
        func.code = f.code.clone();
        remap_strings(&mut func.code, relocate)?;
        functions.push(func);
    }

    let id = vm.add_module(&image.name);
    let mut values = Vec::with_capacity(image.globals.len());
    for (name, kind) in &image.globals {
        let v = match kind {
            GlobalKind::Function(index) => {
                if *index as usize >= functions.len() {
                    return Err(ImageError::Invalid(format!(
                        "function index {} out of range",
                        index
                    )));
                }
                Some(Value::Func(FuncRef { module: id, index: *index }))
            }
            GlobalKind::Module(target) => Some(Value::Module(vm.add_module(target))),
            GlobalKind::Dummy => Some(Value::Dummy),
            GlobalKind::Host => None,
        };
        values.push((name, v));
    }

    let module = vm.module_mut(id)?;
    for (i, (name, v)) in values.into_iter().enumerate() {
        let slot = match (module.globals.index_of(name), v) {
            (Some(slot), None) => slot,
            (_, Some(v)) => module.globals.set(name, v),
            (None, None) => module.globals.set(name, Value::None),
        };
        if slot as usize != i {
            return Err(ImageError::Invalid(format!(
                "global '{}' expected at slot {}, found {}",
                name, i, slot
            )));
        }
    }
    module.code = code;
    module.functions = functions;
    module.kind = ModuleKind::Script;
    module.init = true;

    info!("installed image of module '{}' as #{}", image.name, id);
    Ok(id)
}

pub fn encode(image: &ModuleImage) -> ImageResult<Vec<u8>> {
    let cfg = bincode::config::standard();
    Ok(bincode::serde::encode_to_vec(image, cfg)?)
}

pub fn decode(bytes: &[u8]) -> ImageResult<ModuleImage> {
    let cfg = bincode::config::standard();
    let (image, _consumed): (ModuleImage, usize) = bincode::serde::decode_from_slice(bytes, cfg)?;
    Ok(image)
}

pub fn save(vm: &Vm, module: ModuleId, path: &Path) -> ImageResult<()> {
    let bytes = encode(&capture(vm, module)?)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn load(vm: &mut Vm, path: &Path) -> ImageResult<ModuleId> {
    let bytes = std::fs::read(path)?;
    install(vm, &decode(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_io::BufferIo;
    use crate::vm::compiler::compile_module;
    use crate::config::Config;

    fn compiled(src: &str) -> (Vm, ModuleId) {
        let mut vm = Vm::new();
        let id = vm.add_module("app");
        compile_module(&mut vm, id, src, "app.mat").unwrap();
        (vm, id)
    }

    #[test]
    fn test_strings_are_localized() {
        let mut vm = Vm::new();
        vm.heap.consts.intern("padding");
        let id = vm.add_module("app");
        compile_module(&mut vm, id, "a = \"x\"; b = \"y\"; c = \"x\";", "app.mat").unwrap();
        let image = capture(&vm, id).unwrap();
        assert_eq!(image.strings, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(image.code.words[1], 0);
    }

    #[test]
    fn test_install_into_fresh_runtime() {
        let (vm, id) = compiled(
            "def greet(n) { print(\"hi \"); println(n); } greet(\"there\"); x = 3;",
        );
        let bytes = encode(&capture(&vm, id).unwrap()).unwrap();

        let io = BufferIo::new();
        let mut fresh = Vm::with_config(Config::default(), Box::new(io.clone()));
        fresh.heap.consts.intern("shifts every index");
        let image = decode(&bytes).unwrap();
        let app = install(&mut fresh, &image).unwrap();
        fresh.exec_module(app).unwrap();

        assert_eq!(io.get_output(), "hi there\n");
        assert_eq!(
            fresh.modules[app as usize].globals.get_by_name("x"),
            Some(&Value::Int(3))
        );
    }

    #[test]
    fn test_module_alias_survives() {
        let (vm, id) = compiled("import \"lib\" as l;");
        let image = capture(&vm, id).unwrap();
        assert!(image
            .globals
            .iter()
            .any(|(n, k)| n == "l" && *k == GlobalKind::Module("lib".to_string())));

        let mut fresh = Vm::new();
        let app = install(&mut fresh, &image).unwrap();
        let lib = fresh.module_id("lib").unwrap();
        assert_eq!(
            fresh.modules[app as usize].globals.get_by_name("l"),
            Some(&Value::Module(lib))
        );
    }

    #[test]
    fn test_bad_magic() {
        let (vm, id) = compiled("x = 1;");
        let mut image = capture(&vm, id).unwrap();
        image.magic = 0;
        assert!(matches!(
            install(&mut Vm::new(), &image),
            Err(ImageError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_bytes() {
        assert!(matches!(decode(&[0xff, 0xff]), Err(ImageError::Decode(_))));
    }
}
