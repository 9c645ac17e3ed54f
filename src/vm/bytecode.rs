use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, FromRepr};

use super::machine::{VmErrorKind, VmResult, err};

/// 명령어 워드. 피연산자는 opcode 뒤에 고정 개수의 `u32` 워드로 따라옵니다.
///
/// 점프 대상은 같은 코드 버퍼 안의 절대 워드 위치, 부호 있는 피연산자는 2의 보수 비트,
/// 실수 즉시값은 `f32` 비트 패턴 그대로 저장됩니다.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, EnumCount, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum Opcode {
    Nop,
    /// 모듈 최상위 코드 종료
    Exit,
    /// Operand: 영구 문자열 인덱스 (모듈 이름)
    Import,

    // constants
    PushNone,
    PushString,
    PushInt,
    PushReal,
    Pop,

    // addressing: mod id n
    /// n개의 인덱스 값을 주소 지정된 슬롯의 `Ref`로 치환
    RefObj,
    /// n개의 인덱스 값을 주소 지정된 값의 복사본으로 치환
    PushObj,
    /// Stack: idx1 .. idxn, value →
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,
    AssignExp,
    AssignAnd,
    AssignOr,
    AssignXor,
    AssignShl,
    AssignShr,

    // control flow
    FalseJmp,
    TrueJmp,
    Jmp,

    // unary
    Minus,
    Inc,
    Dec,
    Lnot,
    Bnot,

    // binary
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Bxor,
    Bor,
    Band,
    Shl,
    Shr,
    /// 단락 평가 없음: 양쪽 피연산자 모두 평가됨
    Lor,
    Land,

    // compare
    Neq,
    Eq,
    Ge,
    Le,
    Gt,
    Lt,

    // call/return
    /// Stack: callee, arg1 .. argn → result
    Call,
    Ret,
    RetResult,

    // collections
    MakeList,
    /// Stack: key1, val1, .. keyn, valn → dict
    MakeDict,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OperandKind: u8 {
        /// 영구 문자열 테이블 인덱스
        const STRING = 1 << 0;
        /// 절대 점프 위치
        const TARGET = 1 << 1;
        /// i32 즉시값
        const SIGNED = 1 << 2;
        /// f32 비트 패턴
        const REAL   = 1 << 3;
        /// 개수 (인덱스, 인자, 원소)
        const COUNT  = 1 << 4;
        /// 모듈 참조 슬롯 (-1: 현재 모듈)
        const MODULE = 1 << 5;
        /// 변수 슬롯 (음수: 지역 변수)
        const SLOT   = 1 << 6;
    }
}

const ADDRESS: &[OperandKind] = &[OperandKind::MODULE, OperandKind::SLOT, OperandKind::COUNT];

impl Opcode {
    pub fn from_word(word: u32) -> VmResult<Opcode> {
        Opcode::from_repr(word).ok_or_else(|| {
            err(
                VmErrorKind::UnknownOpcode,
                format!("Unknown opcode {}.", word),
            )
        })
    }

    /// 피연산자 워드 종류 (순서대로)
    pub fn operands(self) -> &'static [OperandKind] {
        use Opcode::*;
        match self {
            Import | PushString => &[OperandKind::STRING],
            PushInt => &[OperandKind::SIGNED],
            PushReal => &[OperandKind::REAL],
            RefObj | PushObj | Assign | AssignAdd | AssignSub | AssignMul | AssignDiv
            | AssignMod | AssignExp | AssignAnd | AssignOr | AssignXor | AssignShl
            | AssignShr => ADDRESS,
            FalseJmp | TrueJmp | Jmp => &[OperandKind::TARGET],
            Call | MakeList | MakeDict => &[OperandKind::COUNT],
            _ => &[],
        }
    }

    pub fn operand_kinds(self) -> OperandKind {
        self.operands()
            .iter()
            .fold(OperandKind::empty(), |acc, k| acc | *k)
    }

    /// opcode 워드를 포함한 명령어 길이
    pub fn width(self) -> usize {
        1 + self.operands().len()
    }

    pub fn is_assign(self) -> bool {
        (Opcode::Assign as u32..=Opcode::AssignShr as u32).contains(&(self as u32))
    }
}

/// (명령어 위치, 소스 줄) 디버그 테이블
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTable {
    entries: Vec<(u32, u32)>,
}

impl LineTable {
    pub fn record(&mut self, pos: usize, line: u32) {
        self.entries.push((pos as u32, line));
    }

    /// `pos` 위치 명령어의 소스 줄
    pub fn line_at(&self, pos: usize) -> Option<u32> {
        let n = self.entries.partition_point(|&(p, _)| p as usize <= pos);
        n.checked_sub(1).map(|i| self.entries[i].1)
    }

    pub fn entries(&self) -> &[(u32, u32)] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBuffer {
    pub words: Vec<u32>,
    pub lines: LineTable,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// opcode를 쓰고 그 위치를 줄 번호와 함께 기록합니다.
    pub fn emit_op(&mut self, op: Opcode, line: u32) -> usize {
        let pos = self.words.len();
        self.lines.record(pos, line);
        self.words.push(op as u32);
        pos
    }

    /// 피연산자 워드를 쓰고 그 위치를 돌려줍니다 (나중에 patch용).
    pub fn emit(&mut self, word: u32) -> usize {
        self.words.push(word);
        self.words.len() - 1
    }

    pub fn emit_i32(&mut self, v: i32) -> usize {
        self.emit(v as u32)
    }

    pub fn emit_f32(&mut self, v: f32) -> usize {
        self.emit(v.to_bits())
    }

    pub fn patch(&mut self, at: usize, word: u32) {
        if let Some(w) = self.words.get_mut(at) {
            *w = word;
        }
    }

    pub fn pos(&self) -> usize {
        self.words.len()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.lines.clear();
    }

    pub fn line_at(&self, pos: usize) -> Option<u32> {
        self.lines.line_at(pos)
    }

    pub fn decode(&self) -> Decoder<'_> {
        Decoder {
            words: &self.words,
            pos: 0,
        }
    }
}

/// 디코딩된 명령어 하나
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoded<'a> {
    pub pos: usize,
    pub op: Opcode,
    pub operands: &'a [u32],
}

pub struct Decoder<'a> {
    words: &'a [u32],
    pos: usize,
}

impl<'a> Iterator for Decoder<'a> {
    type Item = VmResult<Decoded<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let word = *self.words.get(self.pos)?;
        let pos = self.pos;
        let op = match Opcode::from_word(word) {
            Ok(op) => op,
            Err(e) => {
                self.pos = self.words.len();
                return Some(Err(e));
            }
        };
        let end = pos + op.width();
        let Some(operands) = self.words.get(pos + 1..end) else {
            self.pos = self.words.len();
            return Some(Err(err(
                VmErrorKind::UnknownOpcode,
                format!("Truncated {} at {}.", op, pos),
            )));
        };
        self.pos = end;
        Some(Ok(Decoded { pos, op, operands }))
    }
}
