//! 주소 지정: (mod, id, n) 피연산자를 값 위치(`Place`)로 해석
//!
//! REF_OBJ, PUSH_OBJ, ASSIGN* 이 같은 규칙을 씁니다. 기본 슬롯은 현재 프레임의 지역 변수
//! (`id < 0`), 실행 중인 모듈의 전역(`mod == -1`), 또는 전역 `mod`에 묶인 모듈의 멤버이고,
//! 그 뒤 n개의 인덱스 값이 차례로 리스트/딕셔너리를 따라 들어갑니다.

use super::{CodeRef, Vm, VmErrorKind, VmResult, err};
use crate::vm::value::{Place, Value};

const NOT_INDEXABLE: &str = "The object cannot be indexed.";
const INVALID_INDEX: &str = "The index is invalid.";

impl Vm {
    fn current_frame_code(&self) -> VmResult<CodeRef> {
        self.frames
            .last()
            .map(|f| f.code)
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "No active frame."))
    }

    pub(super) fn base_place(&self, m: i32, id: i32) -> VmResult<Place> {
        let code = self.current_frame_code()?;
        if id < 0 {
            if m != -1 {
                return Err(err(
                    VmErrorKind::InvalidModule,
                    "The module name is used by a local object.",
                ));
            }
            let frame = self
                .frames
                .last()
                .ok_or_else(|| err(VmErrorKind::StackUnderflow, "No active frame."))?;
            let idx = (-(id as i64) - 1) as usize;
            return Ok(Place::Stack(frame.base + idx));
        }

        let module = code.module();
        if m == -1 {
            return Ok(Place::Global {
                module,
                slot: id as u32,
            });
        }
        match self.module(module)?.global(m as u32) {
            Some(Value::Module(target)) => Ok(Place::Global {
                module: target,
                slot: id as u32,
            }),
            _ => Err(err(VmErrorKind::InvalidModule, "Invalid module object.")),
        }
    }

    /// 스택 `top - offset - n .. top - offset` 의 인덱스 값으로 위치를 따라갑니다.
    ///
    /// `insert`면 마지막 딕셔너리 인덱스는 없는 키여도 됩니다 (대입 시 삽입).
    pub(super) fn resolve_place(
        &self,
        m: i32,
        id: i32,
        n: usize,
        offset: usize,
        insert: bool,
    ) -> VmResult<Place> {
        let mut place = self.base_place(m, id)?;
        let start = self
            .stack
            .len()
            .checked_sub(offset + n)
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "Stack underflow."))?;

        for i in 0..n {
            let index = self.stack[start + i];
            let last = i + 1 == n;
            place = match self.read_place(place)? {
                Value::List(list) => {
                    let len = self.heap.list(list)?.items.len();
                    match index {
                        Value::Int(ix) if ix >= 0 && (ix as usize) < len => Place::ListItem {
                            list,
                            index: ix as u32,
                        },
                        _ => return Err(err(VmErrorKind::InvalidIndex, INVALID_INDEX)),
                    }
                }
                Value::Dict(dict) => {
                    let key = self.heap.key_of(index)?;
                    if !(insert && last) && self.heap.dict_get(dict, key)?.is_none() {
                        return Err(err(VmErrorKind::InvalidIndex, INVALID_INDEX));
                    }
                    Place::DictEntry { dict, key }
                }
                _ => return Err(err(VmErrorKind::NotIndexable, NOT_INDEXABLE)),
            };
        }
        Ok(place)
    }

    pub(crate) fn read_place(&self, place: Place) -> VmResult<Value> {
        let v = match place {
            Place::Global { module, slot } => self.module(module)?.global(slot),
            Place::Stack(i) => self.stack.get(i).copied(),
            Place::ListItem { list, index } => {
                self.heap.list(list)?.items.get(index as usize).copied()
            }
            Place::DictEntry { dict, key } => self.heap.dict_get(dict, key)?,
        };
        v.ok_or_else(|| err(VmErrorKind::InvalidIndex, INVALID_INDEX))
    }

    pub(crate) fn write_place(&mut self, place: Place, v: Value) -> VmResult<()> {
        match place {
            Place::Global { module, slot } => {
                if !self.module_mut(module)?.set_global(slot, v) {
                    return Err(err(VmErrorKind::InvalidIndex, INVALID_INDEX));
                }
            }
            Place::Stack(i) => match self.stack.get_mut(i) {
                Some(s) => *s = v,
                None => return Err(err(VmErrorKind::InvalidIndex, INVALID_INDEX)),
            },
            Place::ListItem { list, index } => {
                match self.heap.list_mut(list)?.items.get_mut(index as usize) {
                    Some(s) => *s = v,
                    None => return Err(err(VmErrorKind::InvalidIndex, INVALID_INDEX)),
                }
            }
            Place::DictEntry { dict, key } => self.heap.dict_set(dict, key, v)?,
        }
        Ok(())
    }

    /// 오류 메시지용 변수 이름
    pub(super) fn slot_name(&self, m: i32, id: i32) -> String {
        let Ok(code) = self.current_frame_code() else {
            return "?".into();
        };
        let name = if id < 0 {
            match code {
                CodeRef::Function(f) => self
                    .function(f)
                    .ok()
                    .and_then(|func| func.locals.name((-(id as i64) - 1) as u32).map(str::to_string)),
                CodeRef::Module(_) => None,
            }
        } else {
            let module = match self.base_place(m, id) {
                Ok(Place::Global { module, .. }) => Some(module),
                _ => None,
            };
            module
                .and_then(|mid| self.module(mid).ok())
                .and_then(|md| md.globals.name(id as u32).map(str::to_string))
        };
        name.unwrap_or_else(|| "?".into())
    }
}
