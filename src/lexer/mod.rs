mod raw_token;
pub mod token;

use logos::{Lexer as LogosLexer, Logos};
use raw_token::{LexExtras, RawLexError, RawToken};
use std::ops::Range;
pub use raw_token::MAX_IDENTIFIER_LEN;
pub use token::Token;

/// 토큰과 그 시작 줄 (1부터), 바이트 범위
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub line: u32,
    pub span: Range<usize>,
    /// 입력이 끝나서 생긴 오류 (REPL은 다음 줄을 기다림)
    pub incomplete: bool,
}

pub struct Lexer<'source> {
    inner: LogosLexer<'source, RawToken>,
    unread: Vec<Spanned>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Lexer {
            inner: RawToken::lexer_with_extras(
                source,
                LexExtras {
                    line: 1,
                    pending_lines: 0,
                },
            ),
            unread: Vec::new(),
        }
    }

    /// 다음에 읽을 토큰의 줄
    pub fn line(&self) -> u32 {
        self.unread
            .last()
            .map(|t| t.line)
            .unwrap_or(self.inner.extras.line)
    }

    /// 토큰 하나를 되돌립니다. 여러 번 되돌리면 역순으로 다시 읽힙니다.
    pub fn unread(&mut self, token: Spanned) {
        self.unread.push(token);
    }

    pub fn peek(&mut self) -> Result<Token, LexError> {
        let t = self.next_token()?;
        let token = t.token.clone();
        self.unread(t);
        Ok(token)
    }

    pub fn next_token(&mut self) -> Result<Spanned, LexError> {
        if let Some(t) = self.unread.pop() {
            return Ok(t);
        }

        let pending = std::mem::take(&mut self.inner.extras.pending_lines);
        self.inner.extras.line += pending;

        match self.inner.next() {
            Some(Ok(raw)) => Ok(Spanned {
                token: Self::convert_token(raw),
                line: self.inner.extras.line,
                span: self.inner.span(),
            }),
            Some(Err(e)) => Err(self.error(e)),
            None => {
                let pos = self.inner.span().end;
                Ok(Spanned {
                    token: Token::Eof,
                    line: self.inner.extras.line,
                    span: pos..pos,
                })
            }
        }
    }

    fn error(&self, e: RawLexError) -> LexError {
        let (message, incomplete) = match e {
            RawLexError::UnrecognizedSymbol => {
                let c = self.inner.slice().chars().next().unwrap_or('\0');
                (format!("Unrecognize symbol: {}(0x{:x}).", c, c as u32), false)
            }
            RawLexError::UnfinishedString { at_eof } => ("Unfinished string.".to_string(), at_eof),
            RawLexError::BadEscape => ("Error escape.".to_string(), false),
            RawLexError::EmptyHex => ("Hex number has no digits.".to_string(), false),
            RawLexError::UnfinishedComment => ("Unfinished comment block.".to_string(), true),
            RawLexError::IdentifierTooLong => (
                format!(
                    "Identifier is too long. The max length is {}.",
                    MAX_IDENTIFIER_LEN
                ),
                false,
            ),
        };
        LexError {
            message,
            line: self.inner.extras.line,
            span: self.inner.span(),
            incomplete,
        }
    }

    fn convert_token(raw: RawToken) -> Token {
        match raw {
            RawToken::If => Token::If,
            RawToken::Elif => Token::Elif,
            RawToken::Else => Token::Else,
            RawToken::While => Token::While,
            RawToken::Def => Token::Def,
            RawToken::Return => Token::Return,
            RawToken::Break => Token::Break,
            RawToken::Continue => Token::Continue,
            RawToken::Import => Token::Import,
            RawToken::As => Token::As,
            RawToken::None => Token::None,

            RawToken::Identifier(name) => Token::Identifier(name),
            RawToken::Int(i) => Token::Int(i),
            RawToken::Real(r) => Token::Real(r),
            RawToken::Str(s) => Token::Str(s),

            RawToken::Comma => Token::Comma,
            RawToken::Dot => Token::Dot,
            RawToken::Colon => Token::Colon,
            RawToken::Semicolon => Token::Semicolon,
            RawToken::LParen => Token::LParen,
            RawToken::RParen => Token::RParen,
            RawToken::LBracket => Token::LBracket,
            RawToken::RBracket => Token::RBracket,
            RawToken::LBrace => Token::LBrace,
            RawToken::RBrace => Token::RBrace,

            RawToken::Plus => Token::Plus,
            RawToken::Minus => Token::Minus,
            RawToken::Tilde => Token::Tilde,
            RawToken::Bang => Token::Bang,
            RawToken::PlusPlus => Token::PlusPlus,
            RawToken::MinusMinus => Token::MinusMinus,
            RawToken::Star => Token::Star,
            RawToken::Slash => Token::Slash,
            RawToken::Percent => Token::Percent,
            RawToken::Caret => Token::Caret,
            RawToken::Amp => Token::Amp,
            RawToken::Pipe => Token::Pipe,
            RawToken::Hash => Token::Hash,
            RawToken::Shl => Token::Shl,
            RawToken::Shr => Token::Shr,
            RawToken::EqualEqual => Token::EqualEqual,
            RawToken::NotEqual => Token::NotEqual,
            RawToken::Less => Token::Less,
            RawToken::LessEqual => Token::LessEqual,
            RawToken::Greater => Token::Greater,
            RawToken::GreaterEqual => Token::GreaterEqual,
            RawToken::AndAnd => Token::AndAnd,
            RawToken::OrOr => Token::OrOr,
            RawToken::Equal => Token::Equal,
            RawToken::PlusEqual => Token::PlusEqual,
            RawToken::MinusEqual => Token::MinusEqual,
            RawToken::StarEqual => Token::StarEqual,
            RawToken::SlashEqual => Token::SlashEqual,
            RawToken::PercentEqual => Token::PercentEqual,
            RawToken::CaretEqual => Token::CaretEqual,
            RawToken::AmpEqual => Token::AmpEqual,
            RawToken::PipeEqual => Token::PipeEqual,
            RawToken::HashEqual => Token::HashEqual,
            RawToken::ShlEqual => Token::ShlEqual,
            RawToken::ShrEqual => Token::ShrEqual,

            // 줄바꿈/주석 콜백은 항상 Skip 또는 Error를 돌려줌
            RawToken::Trivia => unreachable!("trivia is always skipped"),
        }
    }
}
