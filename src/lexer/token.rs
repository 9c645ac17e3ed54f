use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    If,
    Elif,
    Else,
    While,
    Def,
    Return,
    Break,
    Continue,
    Import,
    As,
    None,
    // Identifiers and literals
    Identifier(String),
    Int(i32),
    Real(f32),
    Str(String),
    // Punctuation
    Comma,
    Dot,
    Colon,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    // Operators
    Plus,
    Minus,
    Tilde,
    Bang,
    PlusPlus,
    MinusMinus,
    Star,
    Slash,
    Percent,
    Caret,
    Amp,
    Pipe,
    Hash,
    Shl,
    Shr,
    EqualEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AndAnd,
    OrOr,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    CaretEqual,
    AmpEqual,
    PipeEqual,
    HashEqual,
    ShlEqual,
    ShrEqual,
    // Special tokens
    Eof,
}

impl Token {
    pub fn is_assign_op(&self) -> bool {
        matches!(
            self,
            Token::Equal
                | Token::PlusEqual
                | Token::MinusEqual
                | Token::StarEqual
                | Token::SlashEqual
                | Token::PercentEqual
                | Token::CaretEqual
                | Token::AmpEqual
                | Token::PipeEqual
                | Token::HashEqual
                | Token::ShlEqual
                | Token::ShrEqual
        )
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            // Keywords
            Token::If => write!(f, "if"),
            Token::Elif => write!(f, "elif"),
            Token::Else => write!(f, "else"),
            Token::While => write!(f, "while"),
            Token::Def => write!(f, "def"),
            Token::Return => write!(f, "return"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::Import => write!(f, "import"),
            Token::As => write!(f, "as"),
            Token::None => write!(f, "none"),

            // Identifiers and literals
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Int(i) => write!(f, "{}", i),
            Token::Real(r) => write!(f, "{}", r),
            Token::Str(s) => write!(f, "\"{}\"", s),

            // Punctuation
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),

            // Operators
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Tilde => write!(f, "~"),
            Token::Bang => write!(f, "!"),
            Token::PlusPlus => write!(f, "++"),
            Token::MinusMinus => write!(f, "--"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Caret => write!(f, "^"),
            Token::Amp => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Hash => write!(f, "#"),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::EqualEqual => write!(f, "=="),
            Token::NotEqual => write!(f, "!="),
            Token::Less => write!(f, "<"),
            Token::LessEqual => write!(f, "<="),
            Token::Greater => write!(f, ">"),
            Token::GreaterEqual => write!(f, ">="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Equal => write!(f, "="),
            Token::PlusEqual => write!(f, "+="),
            Token::MinusEqual => write!(f, "-="),
            Token::StarEqual => write!(f, "*="),
            Token::SlashEqual => write!(f, "/="),
            Token::PercentEqual => write!(f, "%="),
            Token::CaretEqual => write!(f, "^="),
            Token::AmpEqual => write!(f, "&="),
            Token::PipeEqual => write!(f, "|="),
            Token::HashEqual => write!(f, "#="),
            Token::ShlEqual => write!(f, "<<="),
            Token::ShrEqual => write!(f, ">>="),

            // Special tokens
            Token::Eof => write!(f, "<EOF>"),
        }
    }
}
