// compiler 모듈 - 단일 패스 컴파일러
//
// AST 없이 토큰을 읽는 즉시 바이트코드를 내보냅니다. 식별자는 내보내는 시점에
// 모듈/함수의 슬롯 테이블에서 해석되고, 점프는 위치를 기억했다가 나중에 채웁니다.

use std::ops::Range;

use log::debug;

use crate::lexer::{LexError, Lexer, Spanned, Token};
use crate::vm::bytecode::{CodeBuffer, Opcode};
use crate::vm::machine::Vm;
use crate::vm::module::{Function, Module};
use crate::vm::value::{FuncRef, ModuleId, Value};

mod expr;
mod scope;

#[cfg(test)]
mod tests;

pub use scope::Address;

pub const MAX_IF_BRANCHES: usize = 128;
pub const MAX_LOOP_NEST: usize = 64;
pub const MAX_BREAKS: usize = 128;
pub const MAX_CONTINUES: usize = 128;

// ========== 오류 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Lex,
    Syntax,
    /// 입력이 끝나서 더 읽을 수 없음
    Incomplete,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{file}:{line}: {message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub span: Range<usize>,
}

impl CompileError {
    pub fn is_incomplete(&self) -> bool {
        self.kind == CompileErrorKind::Incomplete
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

// ========== 컨텍스트 ==========

/// Loop context for tracking break/continue jumps
#[derive(Debug, Clone, Default)]
struct LoopContext {
    /// Operand positions of break jumps, patched to the loop exit
    break_jumps: Vec<usize>,
    /// Operand positions of continue jumps, patched to the condition entry
    continue_jumps: Vec<usize>,
}

pub struct Compiler<'vm, 'src> {
    vm: &'vm mut Vm,
    lexer: Lexer<'src>,
    file: String,
    module: ModuleId,
    /// 컴파일 중인 함수 (모듈 함수 목록의 인덱스)
    func: Option<u32>,
    loop_stack: Vec<LoopContext>,
}

/// `source`를 모듈 `module`의 최상위 코드로 컴파일합니다.
///
/// 기존 최상위 코드는 지워지고 함수와 전역 슬롯은 누적됩니다. 실패하면 이번 호출에서
/// 추가된 함수와 전역 이름을 되돌립니다.
pub fn compile_module(
    vm: &mut Vm,
    module: ModuleId,
    source: &str,
    file: &str,
) -> CompileResult<()> {
    let (saved_globals, saved_functions) = match vm.modules.get_mut(module as usize) {
        Some(m) => {
            m.code.clear();
            (m.globals.clone(), m.functions.len())
        }
        None => {
            return Err(CompileError {
                kind: CompileErrorKind::Semantic,
                message: format!("Invalid module id {}.", module),
                file: file.to_string(),
                line: 0,
                span: 0..0,
            });
        }
    };

    let result = Compiler::new(vm, module, source, file).program();

    if let Err(e) = &result {
        debug!("compile of '{}' failed: {}", file, e);
        let m = &mut vm.modules[module as usize];
        m.code.clear();
        m.globals = saved_globals;
        m.functions.truncate(saved_functions);
    }
    result
}

impl<'vm, 'src> Compiler<'vm, 'src> {
    pub(crate) fn new(vm: &'vm mut Vm, module: ModuleId, source: &'src str, file: &str) -> Self {
        Self {
            vm,
            lexer: Lexer::new(source),
            file: file.to_string(),
            module,
            func: None,
            loop_stack: Vec::new(),
        }
    }

    // ========== 토큰 ==========

    fn lex_error(&self, e: LexError) -> CompileError {
        CompileError {
            kind: if e.incomplete {
                CompileErrorKind::Incomplete
            } else {
                CompileErrorKind::Lex
            },
            message: e.message,
            file: self.file.clone(),
            line: e.line,
            span: e.span,
        }
    }

    fn error_at(&self, kind: CompileErrorKind, t: &Spanned, message: impl Into<String>) -> CompileError {
        CompileError {
            kind,
            message: message.into(),
            file: self.file.clone(),
            line: t.line,
            span: t.span.clone(),
        }
    }

    fn unexpected(&self, t: &Spanned) -> CompileError {
        self.error_at(
            CompileErrorKind::Syntax,
            t,
            format!("Token \"{}\" is not expected.", t.token),
        )
    }

    /// 입력 끝이어도 되는 위치에서 읽기
    fn next_or_eof(&mut self) -> CompileResult<Spanned> {
        self.lexer.next_token().map_err(|e| self.lex_error(e))
    }

    /// 토큰이 더 있어야 하는 위치에서 읽기. 입력 끝이면 Incomplete
    fn next(&mut self) -> CompileResult<Spanned> {
        let t = self.next_or_eof()?;
        if t.token == Token::Eof {
            return Err(self.error_at(
                CompileErrorKind::Incomplete,
                &t,
                "Unexpected end of input.",
            ));
        }
        Ok(t)
    }

    fn unread(&mut self, t: Spanned) {
        self.lexer.unread(t);
    }

    fn peek(&mut self) -> CompileResult<Token> {
        self.lexer.peek().map_err(|e| self.lex_error(e))
    }

    fn expect(&mut self, token: Token) -> CompileResult<Spanned> {
        let t = self.next()?;
        if t.token != token {
            return Err(self.unexpected(&t));
        }
        Ok(t)
    }

    fn expect_identifier(&mut self) -> CompileResult<(String, Spanned)> {
        let t = self.next()?;
        match &t.token {
            Token::Identifier(name) => Ok((name.clone(), t)),
            _ => Err(self.unexpected(&t)),
        }
    }

    // ========== 코드 생성 ==========

    fn current_module(&self) -> &Module {
        &self.vm.modules[self.module as usize]
    }

    fn current_module_mut(&mut self) -> &mut Module {
        &mut self.vm.modules[self.module as usize]
    }

    fn current_function_mut(&mut self) -> Option<&mut Function> {
        let f = self.func?;
        self.current_module_mut().functions.get_mut(f as usize)
    }

    fn code(&mut self) -> &mut CodeBuffer {
        let module = &mut self.vm.modules[self.module as usize];
        match self.func {
            Some(f) => &mut module.functions[f as usize].code,
            None => &mut module.code,
        }
    }

    fn pos(&mut self) -> usize {
        self.code().pos()
    }

    fn emit_op(&mut self, op: Opcode, line: u32) -> usize {
        self.code().emit_op(op, line)
    }

    fn emit(&mut self, word: u32) -> usize {
        self.code().emit(word)
    }

    /// 점프를 쓰고 나중에 채울 피연산자 위치를 돌려줍니다.
    fn emit_jump(&mut self, op: Opcode, line: u32) -> usize {
        self.emit_op(op, line);
        self.emit(0)
    }

    fn patch(&mut self, at: usize, target: usize) {
        self.code().patch(at, target as u32);
    }

    fn emit_address(&mut self, op: Opcode, line: u32, addr: Address) {
        self.emit_op(op, line);
        self.emit(addr.module as u32);
        self.emit(addr.slot as u32);
        self.emit(addr.indices);
    }

    fn const_index(&mut self, s: &str) -> u32 {
        self.vm.heap.consts.intern(s).index
    }

    // ========== 프로그램 ==========

    pub(crate) fn program(&mut self) -> CompileResult<()> {
        loop {
            let t = self.next_or_eof()?;
            match t.token {
                Token::Eof => {
                    self.emit_op(Opcode::Exit, t.line);
                    return Ok(());
                }
                Token::Def => self.function()?,
                _ => {
                    self.unread(t);
                    self.statement()?;
                }
            }
        }
    }

    fn statement(&mut self) -> CompileResult<()> {
        let t = self.next()?;
        match t.token {
            Token::Semicolon => Ok(()),
            Token::Break => self.break_statement(&t),
            Token::Continue => self.continue_statement(&t),
            Token::Return => self.return_statement(&t),
            Token::If => self.if_statement(&t),
            Token::While => self.while_statement(&t),
            Token::LBrace => {
                self.unread(t);
                self.block()
            }
            Token::Identifier(_) => {
                self.unread(t);
                self.assign_or_call()
            }
            Token::Import => {
                if self.func.is_some() || !self.loop_stack.is_empty() {
                    return Err(self.error_at(
                        CompileErrorKind::Semantic,
                        &t,
                        "\"import\" can only be used in global space.",
                    ));
                }
                self.import()
            }
            _ => Err(self.error_at(CompileErrorKind::Syntax, &t, "Unknown statement.")),
        }
    }

    /// `{ ... }` 또는 단일 문장
    fn body(&mut self) -> CompileResult<()> {
        if self.peek()? == Token::LBrace {
            self.block()
        } else {
            self.statement()
        }
    }

    fn block(&mut self) -> CompileResult<()> {
        self.expect(Token::LBrace)?;
        loop {
            let t = self.next()?;
            if t.token == Token::RBrace {
                return Ok(());
            }
            self.unread(t);
            self.statement()?;
        }
    }

    // ========== 제어 흐름 ==========

    fn break_statement(&mut self, t: &Spanned) -> CompileResult<()> {
        let Some(count) = self.loop_stack.last().map(|l| l.break_jumps.len()) else {
            return Err(self.error_at(
                CompileErrorKind::Semantic,
                t,
                "Cannot find loop statement to break.",
            ));
        };
        if count >= MAX_BREAKS {
            return Err(self.error_at(
                CompileErrorKind::Semantic,
                t,
                format!(
                    "There are too many \"break\" in the loop statement, the max value is {}.",
                    MAX_BREAKS
                ),
            ));
        }
        let at = self.emit_jump(Opcode::Jmp, t.line);
        if let Some(l) = self.loop_stack.last_mut() {
            l.break_jumps.push(at);
        }
        self.expect(Token::Semicolon)?;
        Ok(())
    }

    fn continue_statement(&mut self, t: &Spanned) -> CompileResult<()> {
        let Some(count) = self.loop_stack.last().map(|l| l.continue_jumps.len()) else {
            return Err(self.error_at(
                CompileErrorKind::Semantic,
                t,
                "Cannot find loop statement to continue.",
            ));
        };
        if count >= MAX_CONTINUES {
            return Err(self.error_at(
                CompileErrorKind::Semantic,
                t,
                format!(
                    "There are too many \"continue\" in the loop statement, the max value is {}.",
                    MAX_CONTINUES
                ),
            ));
        }
        let at = self.emit_jump(Opcode::Jmp, t.line);
        if let Some(l) = self.loop_stack.last_mut() {
            l.continue_jumps.push(at);
        }
        self.expect(Token::Semicolon)?;
        Ok(())
    }

    fn return_statement(&mut self, t: &Spanned) -> CompileResult<()> {
        if self.func.is_none() {
            return Err(self.error_at(
                CompileErrorKind::Semantic,
                t,
                "\"return\" can only be used in function.",
            ));
        }
        let next = self.next()?;
        if next.token == Token::Semicolon {
            self.emit_op(Opcode::Ret, next.line);
            return Ok(());
        }
        self.unread(next);
        self.expression()?;
        self.emit_op(Opcode::RetResult, t.line);
        self.expect(Token::Semicolon)?;
        Ok(())
    }

    fn if_statement(&mut self, t: &Spanned) -> CompileResult<()> {
        self.expression()?;
        let mut last_jump = self.emit_jump(Opcode::FalseJmp, t.line);
        self.body()?;

        let mut exits = Vec::new();
        let mut t = self.next_or_eof()?;
        loop {
            if matches!(t.token, Token::Elif | Token::Else) {
                if exits.len() >= MAX_IF_BRANCHES {
                    return Err(self.error_at(
                        CompileErrorKind::Semantic,
                        &t,
                        format!(
                            "There are too many branches in the if statement, the max value is {}.",
                            MAX_IF_BRANCHES
                        ),
                    ));
                }
                exits.push(self.emit_jump(Opcode::Jmp, t.line));
            }
            if t.token != Token::Elif {
                break;
            }

            let here = self.pos();
            self.patch(last_jump, here);
            self.expression()?;
            last_jump = self.emit_jump(Opcode::FalseJmp, t.line);
            self.body()?;
            t = self.next_or_eof()?;
        }

        let here = self.pos();
        self.patch(last_jump, here);
        if t.token == Token::Else {
            self.body()?;
        } else {
            self.unread(t);
        }

        let end = self.pos();
        for at in exits {
            self.patch(at, end);
        }
        Ok(())
    }

    fn while_statement(&mut self, t: &Spanned) -> CompileResult<()> {
        if self.loop_stack.len() >= MAX_LOOP_NEST {
            return Err(self.error_at(
                CompileErrorKind::Semantic,
                t,
                format!(
                    "There are too many nested loops, the max value is {}.",
                    MAX_LOOP_NEST
                ),
            ));
        }

        let entry = self.pos();
        self.expression()?;
        let exit_jump = self.emit_jump(Opcode::FalseJmp, t.line);

        self.loop_stack.push(LoopContext::default());
        let body = self.body();
        let ctx = self.loop_stack.pop().unwrap_or_default();
        body?;

        self.emit_op(Opcode::Jmp, t.line);
        self.emit(entry as u32);

        let end = self.pos();
        self.patch(exit_jump, end);
        for at in ctx.continue_jumps {
            self.patch(at, entry);
        }
        for at in ctx.break_jumps {
            self.patch(at, end);
        }
        Ok(())
    }

    // ========== 대입 / 호출 문장 ==========

    fn assign_or_call(&mut self) -> CompileResult<()> {
        let addr = self.lvalue()?;
        let t = self.next()?;

        if let Some(op) = assign_opcode(&t.token) {
            self.expression()?;
            self.emit_address(op, t.line, addr);
            self.expect(Token::Semicolon)?;
            Ok(())
        } else if t.token == Token::LParen {
            self.emit_address(Opcode::PushObj, t.line, addr);
            self.call_args()?;
            let semi = self.expect(Token::Semicolon)?;
            self.emit_op(Opcode::Pop, semi.line);
            Ok(())
        } else {
            Err(self.error_at(
                CompileErrorKind::Syntax,
                &t,
                "Expect operator or \"(\".",
            ))
        }
    }

    // ========== 함수 정의 ==========

    fn function(&mut self) -> CompileResult<()> {
        let (name, name_tok) = self.expect_identifier()?;

        let taken = self
            .current_module()
            .globals
            .get_by_name(&name)
            .is_some_and(|v| *v != Value::Dummy);
        if taken {
            return Err(self.error_at(
                CompileErrorKind::Semantic,
                &name_tok,
                format!(
                    "The function name \"{}\" has been used in another place.",
                    name
                ),
            ));
        }

        // 본문보다 먼저 등록해야 재귀 호출이 해석됩니다.
        let module = self.module;
        let index = {
            let m = self.current_module_mut();
            m.functions.push(Function::new(&name));
            let index = (m.functions.len() - 1) as u32;
            m.globals.set(&name, Value::Func(FuncRef { module, index }));
            index
        };
        debug!("compiling function '{}' (#{})", name, index);

        self.func = Some(index);
        let result = self.parameters().and_then(|_| self.block());
        if result.is_ok() {
            let line = self.lexer.line();
            self.emit_op(Opcode::Ret, line);
        }
        self.func = None;
        result
    }

    fn parameters(&mut self) -> CompileResult<()> {
        self.expect(Token::LParen)?;
        let mut t = self.next()?;
        if t.token == Token::RParen {
            return Ok(());
        }

        loop {
            let Token::Identifier(param) = &t.token else {
                return Err(self.unexpected(&t));
            };
            let param = param.clone();
            let duplicate = self
                .current_function_mut()
                .is_some_and(|f| f.locals.index_of(&param).is_some());
            if duplicate {
                return Err(self.error_at(
                    CompileErrorKind::Semantic,
                    &t,
                    format!("The parameter \"{}\" is declared twice.", param),
                ));
            }
            if let Some(f) = self.current_function_mut() {
                f.locals.set(&param, ());
                f.arity += 1;
            }

            t = self.next()?;
            match t.token {
                Token::RParen => return Ok(()),
                Token::Comma => t = self.next()?,
                _ => return Err(self.unexpected(&t)),
            }
        }
    }

    // ========== import ==========

    fn import(&mut self) -> CompileResult<()> {
        let t = self.next()?;
        let Token::Str(name) = &t.token else {
            return Err(self.unexpected(&t));
        };
        let name = name.clone();

        let ix = self.const_index(&name);
        self.emit_op(Opcode::Import, t.line);
        self.emit(ix);
        let target = self.vm.add_module(&name);

        let next = self.next()?;
        let alias = match next.token {
            Token::As => {
                let (alias, _) = self.expect_identifier()?;
                self.expect(Token::Semicolon)?;
                Some(alias)
            }
            Token::Semicolon => is_identifier(&name).then(|| name.clone()),
            _ => return Err(self.unexpected(&next)),
        };

        if let Some(alias) = alias {
            debug!("module '{}' bound as '{}'", name, alias);
            self.current_module_mut()
                .globals
                .set(&alias, Value::Module(target));
        }
        Ok(())
    }
}

fn assign_opcode(token: &Token) -> Option<Opcode> {
    Some(match token {
        Token::Equal => Opcode::Assign,
        Token::PlusEqual => Opcode::AssignAdd,
        Token::MinusEqual => Opcode::AssignSub,
        Token::StarEqual => Opcode::AssignMul,
        Token::SlashEqual => Opcode::AssignDiv,
        Token::PercentEqual => Opcode::AssignMod,
        Token::CaretEqual => Opcode::AssignExp,
        Token::AmpEqual => Opcode::AssignAnd,
        Token::PipeEqual => Opcode::AssignOr,
        Token::HashEqual => Opcode::AssignXor,
        Token::ShlEqual => Opcode::AssignShl,
        Token::ShrEqual => Opcode::AssignShr,
        _ => return None,
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(
            s,
            "if" | "elif"
                | "else"
                | "while"
                | "def"
                | "return"
                | "break"
                | "continue"
                | "import"
                | "as"
                | "none"
        )
}
