//! 식별자 해석
//!
//! 함수 안에서는 지역 테이블, 모듈 전역 순서로 찾고 없으면 새 지역 변수로 봅니다.
//! 모듈 최상위에서는 전역만 보고 없으면 `Dummy` 슬롯을 만듭니다.

use super::{CompileResult, Compiler};
use crate::lexer::Token;
use crate::vm::value::{ModuleId, Value};

/// REF_OBJ / PUSH_OBJ / ASSIGN* 의 피연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    /// -1: 현재 모듈, 그 외: 모듈이 묶인 전역 슬롯
    pub module: i32,
    /// 음수: 지역 변수 `-slot - 1`
    pub slot: i32,
    /// 스택에 쌓인 인덱스 값의 개수
    pub indices: u32,
}

impl Address {
    fn new(slot: i32) -> Self {
        Self {
            module: -1,
            slot,
            indices: 0,
        }
    }
}

impl Compiler<'_, '_> {
    /// 한정자 없는 이름의 슬롯
    pub(super) fn resolve(&mut self, name: &str) -> i32 {
        let module = &mut self.vm.modules[self.module as usize];
        match self.func {
            Some(f) => {
                let locals = &module.functions[f as usize].locals;
                if let Some(ix) = locals.index_of(name) {
                    return -(ix as i32) - 1;
                }
                if let Some(g) = module.globals.index_of(name) {
                    return g as i32;
                }
                let ix = module.functions[f as usize].locals.set(name, ());
                -(ix as i32) - 1
            }
            None => match module.globals.index_of(name) {
                Some(g) => g as i32,
                None => module.globals.set(name, Value::Dummy) as i32,
            },
        }
    }

    /// 전역 슬롯에 컴파일 시점에 묶인 모듈
    fn bound_module(&self, slot: i32) -> Option<ModuleId> {
        if slot < 0 {
            return None;
        }
        match self.current_module().global(slot as u32) {
            Some(Value::Module(m)) => Some(m),
            _ => None,
        }
    }

    /// 다른 모듈의 멤버 슬롯. 없으면 `Dummy`로 예약
    fn member_slot(&mut self, target: ModuleId, name: &str) -> i32 {
        let globals = &mut self.vm.modules[target as usize].globals;
        match globals.index_of(name) {
            Some(ix) => ix as i32,
            None => globals.set(name, Value::Dummy) as i32,
        }
    }

    /// `IDENT [':' IDENT] { '[' expr ']' }`
    ///
    /// 인덱스 식은 순서대로 코드로 내보내고 주소에는 개수만 남깁니다.
    pub(super) fn lvalue(&mut self) -> CompileResult<Address> {
        let (name, _) = self.expect_identifier()?;
        let mut addr = Address::new(self.resolve(&name));

        let colon = self.next_or_eof()?;
        match (colon.token == Token::Colon, self.bound_module(addr.slot)) {
            (true, Some(target)) => {
                let member = self.next_or_eof()?;
                if let Token::Identifier(sub) = &member.token {
                    let sub = sub.clone();
                    addr = Address {
                        module: addr.slot,
                        slot: self.member_slot(target, &sub),
                        indices: 0,
                    };
                } else {
                    // 딕셔너리 리터럴의 `key: value`
                    self.unread(member);
                    self.unread(colon);
                }
            }
            _ => self.unread(colon),
        }

        loop {
            let t = self.next_or_eof()?;
            if t.token != Token::LBracket {
                self.unread(t);
                return Ok(addr);
            }
            self.expression()?;
            self.expect(Token::RBracket)?;
            addr.indices += 1;
        }
    }
}
