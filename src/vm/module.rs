//! 모듈과 함수 객체
//!
//! 모듈은 VM의 모듈 목록에 `ModuleId`로 저장됩니다. 스크립트 모듈은 최상위 코드와 함수를
//! 갖고, 네이티브 모듈은 플러그인이 전역 테이블만 채웁니다.

use std::path::PathBuf;

use super::bytecode::CodeBuffer;
use super::slots::SlotTable;
use super::value::Value;

pub const BUILTINS_MODULE: &str = "__builtins__";
pub const BUILTINS_ID: u32 = 0;

#[derive(Debug, Clone)]
pub struct Function {
    pub name: Box<str>,
    pub arity: u32,
    pub code: CodeBuffer,
    /// 파라미터(0..arity) 다음에 지역 변수
    pub locals: SlotTable<()>,
}

impl Function {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            arity: 0,
            code: CodeBuffer::new(),
            locals: SlotTable::new(),
        }
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    /// 등록된 플러그인 번호
    Native { plugin: usize },
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: Box<str>,
    pub kind: ModuleKind,
    pub code: CodeBuffer,
    pub functions: Vec<Function>,
    pub globals: SlotTable<Value>,
    pub init: bool,
    /// 소스 파일 (오류 메시지용)
    pub path: Option<PathBuf>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            kind: ModuleKind::Script,
            code: CodeBuffer::new(),
            functions: Vec::new(),
            globals: SlotTable::new(),
            init: false,
            path: None,
        }
    }

    pub fn global(&self, slot: u32) -> Option<Value> {
        self.globals.get(slot).copied()
    }

    pub fn set_global(&mut self, slot: u32, v: Value) -> bool {
        match self.globals.get_mut(slot) {
            Some(g) => {
                *g = v;
                true
            }
            None => false,
        }
    }

    /// 오류 메시지에 쓰는 파일 이름
    pub fn file_name(&self) -> String {
        match &self.path {
            Some(p) => p.display().to_string(),
            None => self.name.to_string(),
        }
    }
}
