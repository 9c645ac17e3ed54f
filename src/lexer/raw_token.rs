use logos::{FilterResult, Logos, Skip};

pub const MAX_IDENTIFIER_LEN: usize = 256;

/// logos 단계의 오류. 메시지는 `Lexer`가 만듭니다.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawLexError {
    #[default]
    UnrecognizedSymbol,
    /// `at_eof`: 입력 끝에서 끊김
    UnfinishedString { at_eof: bool },
    BadEscape,
    /// 자릿수 없는 `0x`
    EmptyHex,
    UnfinishedComment,
    IdentifierTooLong,
}

#[derive(Debug, Default)]
pub struct LexExtras {
    pub line: u32,
    /// 문자열 안의 줄 이음으로 넘어간 줄 수 (다음 토큰부터 반영)
    pub pending_lines: u32,
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(extras = LexExtras)]
#[logos(error = RawLexError)]
#[logos(skip r"[ \t\f\v]+")]
#[logos(skip r"//[^\r\n]*")]
pub enum RawToken {
    #[regex(r"\r\n|\r|\n", newline)]
    #[token("/*", block_comment)]
    Trivia,

    // Keywords
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("def")]
    Def,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("import")]
    Import,
    #[token("as")]
    As,
    #[token("none")]
    None,

    // Identifiers and literals
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", lex_identifier)]
    Identifier(String),
    #[regex(r"0[xX][0-9a-fA-F]*", lex_hex)]
    #[regex(r"[0-9]+", lex_decimal)]
    Int(i32),
    #[regex(r"[0-9]+\.[0-9]*", lex_real)]
    Real(f32),
    #[token("\"", lex_string)]
    Str(String),

    // Punctuation
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("#")]
    Hash,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    NotEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("=")]
    Equal,
    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("*=")]
    StarEqual,
    #[token("/=")]
    SlashEqual,
    #[token("%=")]
    PercentEqual,
    #[token("^=")]
    CaretEqual,
    #[token("&=")]
    AmpEqual,
    #[token("|=")]
    PipeEqual,
    #[token("#=")]
    HashEqual,
    #[token("<<=")]
    ShlEqual,
    #[token(">>=")]
    ShrEqual,
}

/// `\r\n`은 한 줄로 셉니다.
pub(crate) fn count_lines(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut n = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\n' => n += 1,
            b'\r' if bytes.get(i + 1) != Some(&b'\n') => n += 1,
            _ => {}
        }
    }
    n
}

fn newline(lexer: &mut logos::Lexer<RawToken>) -> Skip {
    lexer.extras.line += 1;
    Skip
}

fn block_comment(lexer: &mut logos::Lexer<RawToken>) -> FilterResult<(), RawLexError> {
    let rest = lexer.remainder();
    match rest.find("*/") {
        Some(end) => {
            lexer.extras.line += count_lines(&rest[..end]);
            lexer.bump(end + 2);
            FilterResult::Skip
        }
        None => {
            lexer.extras.line += count_lines(rest);
            lexer.bump(rest.len());
            FilterResult::Error(RawLexError::UnfinishedComment)
        }
    }
}

fn lex_identifier(lexer: &mut logos::Lexer<RawToken>) -> Result<String, RawLexError> {
    let slice = lexer.slice();
    if slice.len() > MAX_IDENTIFIER_LEN {
        return Err(RawLexError::IdentifierTooLong);
    }
    Ok(slice.to_string())
}

fn lex_hex(lexer: &mut logos::Lexer<RawToken>) -> Result<i32, RawLexError> {
    let digits = &lexer.slice()[2..];
    if digits.is_empty() {
        return Err(RawLexError::EmptyHex);
    }
    Ok(digits
        .chars()
        .filter_map(|c| c.to_digit(16))
        .fold(0u32, |n, d| n.wrapping_mul(16).wrapping_add(d)) as i32)
}

fn lex_decimal(lexer: &mut logos::Lexer<RawToken>) -> i32 {
    lexer
        .slice()
        .bytes()
        .fold(0i32, |n, b| n.wrapping_mul(10).wrapping_add((b - b'0') as i32))
}

fn lex_real(lexer: &mut logos::Lexer<RawToken>) -> f32 {
    lexer.slice().parse::<f32>().unwrap_or(0.0)
}

fn lex_string(lexer: &mut logos::Lexer<RawToken>) -> Result<String, RawLexError> {
    let rest = lexer.remainder();
    let mut out = String::new();
    let mut chars = rest.char_indices().peekable();
    let mut continued = 0;

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                lexer.bump(i + 1);
                lexer.extras.pending_lines += continued;
                return Ok(out);
            }
            '\r' | '\n' => {
                lexer.bump(i);
                return Err(RawLexError::UnfinishedString { at_eof: false });
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\n')) => continued += 1,
                Some((_, '\r')) => {
                    if let Some((_, '\n')) = chars.peek() {
                        chars.next();
                    }
                    continued += 1;
                }
                Some((j, _)) => {
                    lexer.bump(j);
                    return Err(RawLexError::BadEscape);
                }
                None => break,
            },
            _ => out.push(c),
        }
    }

    lexer.bump(rest.len());
    lexer.extras.pending_lines += continued;
    Err(RawLexError::UnfinishedString { at_eof: true })
}
