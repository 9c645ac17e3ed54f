use super::{CompileErrorKind, CompileResult, Compiler};
use crate::lexer::Token;
use crate::vm::bytecode::Opcode;

fn compare_opcode(token: &Token) -> Option<Opcode> {
    Some(match token {
        Token::EqualEqual => Opcode::Eq,
        Token::NotEqual => Opcode::Neq,
        Token::Less => Opcode::Lt,
        Token::LessEqual => Opcode::Le,
        Token::Greater => Opcode::Gt,
        Token::GreaterEqual => Opcode::Ge,
        Token::AndAnd => Opcode::Land,
        Token::OrOr => Opcode::Lor,
        _ => return None,
    })
}

fn additive_opcode(token: &Token) -> Option<Opcode> {
    match token {
        Token::Plus => Some(Opcode::Add),
        Token::Minus => Some(Opcode::Sub),
        _ => None,
    }
}

fn term_opcode(token: &Token) -> Option<Opcode> {
    Some(match token {
        Token::Star => Opcode::Mul,
        Token::Slash => Opcode::Div,
        Token::Percent => Opcode::Mod,
        Token::Caret => Opcode::Exp,
        Token::Amp => Opcode::Band,
        Token::Pipe => Opcode::Bor,
        Token::Hash => Opcode::Bxor,
        Token::Shl => Opcode::Shl,
        Token::Shr => Opcode::Shr,
        _ => return None,
    })
}

/// 단항 연산자. `+`는 코드를 내지 않습니다.
fn unary_opcode(token: &Token) -> Option<Option<Opcode>> {
    Some(match token {
        Token::Tilde => Some(Opcode::Bnot),
        Token::Bang => Some(Opcode::Lnot),
        Token::PlusPlus => Some(Opcode::Inc),
        Token::MinusMinus => Some(Opcode::Dec),
        Token::Minus => Some(Opcode::Minus),
        Token::Plus => None,
        _ => return None,
    })
}

impl Compiler<'_, '_> {
    /// 비교/논리 연산 (가장 낮은 우선순위, 왼쪽 결합)
    pub(super) fn expression(&mut self) -> CompileResult<()> {
        self.binary_level(Self::sub_expression, compare_opcode)
    }

    fn sub_expression(&mut self) -> CompileResult<()> {
        self.binary_level(Self::term, additive_opcode)
    }

    fn term(&mut self) -> CompileResult<()> {
        self.binary_level(Self::factor, term_opcode)
    }

    fn binary_level(
        &mut self,
        operand: fn(&mut Self) -> CompileResult<()>,
        opcode: fn(&Token) -> Option<Opcode>,
    ) -> CompileResult<()> {
        operand(self)?;
        loop {
            let t = self.next_or_eof()?;
            let Some(op) = opcode(&t.token) else {
                self.unread(t);
                return Ok(());
            };
            operand(self)?;
            self.emit_op(op, t.line);
        }
    }

    fn factor(&mut self) -> CompileResult<()> {
        let first = self.next()?;
        let (unary, t) = match unary_opcode(&first.token) {
            Some(op) => (Some(op), self.next()?),
            None => (None, first),
        };

        match &t.token {
            Token::LBracket => self.make_list()?,
            Token::LBrace => self.make_dict()?,
            Token::None => {
                self.emit_op(Opcode::PushNone, t.line);
            }
            Token::Int(i) => {
                let i = *i;
                self.emit_op(Opcode::PushInt, t.line);
                self.emit(i as u32);
            }
            Token::Real(r) => {
                let bits = r.to_bits();
                self.emit_op(Opcode::PushReal, t.line);
                self.emit(bits);
            }
            Token::Str(s) => {
                if unary.is_some() {
                    return Err(self.error_at(
                        CompileErrorKind::Syntax,
                        &t,
                        "Invalid unary operator.",
                    ));
                }
                let s = s.clone();
                let ix = self.const_index(&s);
                self.emit_op(Opcode::PushString, t.line);
                self.emit(ix);
            }
            Token::LParen => {
                self.expression()?;
                self.expect(Token::RParen)?;
            }
            Token::Identifier(_) => {
                self.unread(t.clone());
                self.rvalue()?;
            }
            _ => {
                return Err(self.error_at(
                    CompileErrorKind::Syntax,
                    &t,
                    "Invalid expression.",
                ));
            }
        }

        if let Some(Some(op)) = unary {
            self.emit_op(op, t.line);
        }
        Ok(())
    }

    /// 변수 읽기 또는 호출 결과
    fn rvalue(&mut self) -> CompileResult<()> {
        let addr = self.lvalue()?;
        let t = self.next_or_eof()?;
        let line = t.line;
        if t.token == Token::LParen {
            self.emit_address(Opcode::PushObj, line, addr);
            self.call_args()
        } else {
            self.unread(t);
            self.emit_address(Opcode::PushObj, line, addr);
            Ok(())
        }
    }

    /// `(` 다음부터 `)`까지 인자를 내보내고 CALL
    pub(super) fn call_args(&mut self) -> CompileResult<()> {
        let mut argc = 0u32;
        let mut t = self.next()?;
        while t.token != Token::RParen {
            self.unread(t);
            self.expression()?;
            argc += 1;

            t = self.next()?;
            if t.token == Token::Comma {
                t = self.next()?;
            } else if t.token != Token::RParen {
                return Err(self.unexpected(&t));
            }
        }
        self.emit_op(Opcode::Call, t.line);
        self.emit(argc);
        Ok(())
    }

    fn make_list(&mut self) -> CompileResult<()> {
        let mut size = 0u32;
        loop {
            let t = self.next()?;
            if t.token == Token::RBracket {
                self.emit_op(Opcode::MakeList, t.line);
                self.emit(size);
                return Ok(());
            }
            if size == 0 {
                self.unread(t);
            } else if t.token != Token::Comma {
                return Err(self.unexpected(&t));
            }
            self.expression()?;
            size += 1;
        }
    }

    fn make_dict(&mut self) -> CompileResult<()> {
        let mut size = 0u32;
        loop {
            let t = self.next()?;
            if t.token == Token::RBrace {
                self.emit_op(Opcode::MakeDict, t.line);
                self.emit(size);
                return Ok(());
            }
            if size == 0 {
                self.unread(t);
            } else if t.token != Token::Comma {
                return Err(self.unexpected(&t));
            }
            self.expression()?;
            self.expect(Token::Colon)?;
            self.expression()?;
            size += 1;
        }
    }
}
