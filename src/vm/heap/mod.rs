// heap 모듈 - 문자열/리스트/딕셔너리 저장소
//
// 값(Value)은 핸들만 들고 있고 실제 객체는 여기 있습니다.

mod gc;
mod pool;
mod strings;

pub use gc::GcStats;
pub use pool::{Pool, Poolable, SIZE_CLASSES, class_for_request};
pub use strings::{StrObj, StringTable};

use crate::vm::hash::{HashTable, hash_int};
use crate::vm::machine::{VmErrorKind, VmResult, err};
use crate::vm::value::{Handle, Key, StrRef, Value};

// ========== 객체 타입 ==========

#[derive(Debug, Default)]
pub struct ListObj {
    pub items: Vec<Value>,
}

impl Poolable for ListObj {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    fn capacity(&self) -> usize {
        self.items.capacity()
    }

    fn reset(&mut self) {
        self.items.clear();
    }
}

#[derive(Debug, Default)]
pub struct DictObj {
    pub table: HashTable<Key, Value>,
}

impl Poolable for DictObj {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
        }
    }

    fn capacity(&self) -> usize {
        self.table.capacity()
    }

    fn reset(&mut self) {
        self.table.clear();
    }
}

// ========== Heap ==========

#[derive(Debug, Default)]
pub struct Heap {
    /// 바이트코드 상수와 식별자. 수거되지 않음
    pub consts: StringTable,
    /// 실행 중 만들어진 문자열
    pub strings: StringTable,
    pub lists: Pool<ListObj>,
    pub dicts: Pool<DictObj>,
}

fn dangling(what: &str) -> crate::vm::machine::VmError {
    err(
        VmErrorKind::DanglingHandle,
        format!("The {} object has been collected.", what),
    )
}

fn str_of<'a>(consts: &'a StringTable, strings: &'a StringTable, r: StrRef) -> Option<&'a StrObj> {
    match r {
        StrRef::Const(ix) => consts.get_index(ix),
        StrRef::Heap(h) => strings.get(h),
    }
}

/// 딕셔너리 키 비교. 문자열은 내용으로 비교합니다.
fn key_eq(consts: &StringTable, strings: &StringTable, a: &Key, b: &Key) -> bool {
    match (a, b) {
        (Key::Int(x), Key::Int(y)) => x == y,
        (Key::Str(x), Key::Str(y)) => {
            x == y
                || match (str_of(consts, strings, *x), str_of(consts, strings, *y)) {
                    (Some(p), Some(q)) => p.text == q.text,
                    _ => false,
                }
        }
        _ => false,
    }
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== 문자열 =====

    pub fn intern_const(&mut self, s: &str) -> StrRef {
        StrRef::Const(self.consts.intern(s).index)
    }

    pub fn new_string(&mut self, s: &str) -> StrRef {
        StrRef::Heap(self.strings.intern(s))
    }

    pub fn str_obj(&self, r: StrRef) -> VmResult<&StrObj> {
        str_of(&self.consts, &self.strings, r).ok_or_else(|| dangling("string"))
    }

    pub fn str(&self, r: StrRef) -> VmResult<&str> {
        Ok(&self.str_obj(r)?.text)
    }

    pub fn const_str(&self, index: u32) -> VmResult<&str> {
        self.str(StrRef::Const(index))
    }

    pub fn str_eq(&self, a: StrRef, b: StrRef) -> bool {
        key_eq(&self.consts, &self.strings, &Key::Str(a), &Key::Str(b))
    }

    pub fn key_hash(&self, key: &Key) -> VmResult<u32> {
        match key {
            Key::Int(i) => Ok(hash_int(*i)),
            Key::Str(s) => Ok(self.str_obj(*s)?.hash),
        }
    }

    /// 값을 딕셔너리 키로 변환. int/string 외에는 오류
    pub fn key_of(&self, v: Value) -> VmResult<Key> {
        Key::from_value(v).ok_or_else(|| {
            err(
                VmErrorKind::Unhashable,
                format!("The {} value cannot be used as a dict key.", v.value_type()),
            )
        })
    }

    // ===== 리스트 =====

    pub fn alloc_list(&mut self, items: Vec<Value>) -> Handle {
        let h = self.lists.alloc(items.len());
        if let Some(list) = self.lists.get_mut(h) {
            list.items.extend(items);
        }
        h
    }

    pub fn list(&self, h: Handle) -> VmResult<&ListObj> {
        self.lists.get(h).ok_or_else(|| dangling("list"))
    }

    pub fn list_mut(&mut self, h: Handle) -> VmResult<&mut ListObj> {
        self.lists.get_mut(h).ok_or_else(|| dangling("list"))
    }

    // ===== 딕셔너리 =====

    pub fn alloc_dict(&mut self, n: usize) -> Handle {
        // 적재율 2/3 아래로 유지되도록 여유를 둠
        self.dicts.alloc(n + n / 2)
    }

    pub fn dict(&self, h: Handle) -> VmResult<&DictObj> {
        self.dicts.get(h).ok_or_else(|| dangling("dict"))
    }

    pub fn dict_get(&self, h: Handle, key: Key) -> VmResult<Option<Value>> {
        let hash = self.key_hash(&key)?;
        let dict = self.dict(h)?;
        let (consts, strings) = (&self.consts, &self.strings);
        Ok(dict
            .table
            .get(hash, |k| key_eq(consts, strings, k, &key))
            .copied())
    }

    pub fn dict_set(&mut self, h: Handle, key: Key, value: Value) -> VmResult<()> {
        let hash = self.key_hash(&key)?;
        let (consts, strings) = (&self.consts, &self.strings);
        let dict = self.dicts.get_mut(h).ok_or_else(|| dangling("dict"))?;
        dict.table
            .insert(hash, key, value, |k| key_eq(consts, strings, k, &key));
        Ok(())
    }

    pub fn dict_len(&self, h: Handle) -> VmResult<usize> {
        Ok(self.dict(h)?.table.len())
    }

    /// 삽입 순서가 아닌 테이블 순서로 (키, 값) 목록
    pub fn dict_entries(&self, h: Handle) -> VmResult<Vec<(Key, Value)>> {
        Ok(self
            .dict(h)?
            .table
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect())
    }
}
