//! 문자열 인터닝 테이블
//!
//! 같은 내용의 문자열은 테이블 안에 하나만 존재합니다. 영구 테이블(식별자, 리터럴)은
//! 절대 수거되지 않고, GC 테이블은 매 사이클 마킹되지 않은 문자열을 해제합니다.

use crate::vm::hash::{HashTable, hash_bytes};
use crate::vm::value::Handle;

#[derive(Debug, Clone)]
pub struct StrObj {
    pub text: Box<str>,
    /// 생성 시 한 번 계산되고 다시 바뀌지 않음
    pub hash: u32,
}

#[derive(Debug, Clone, Default)]
struct StrSlot {
    generation: u32,
    marked: bool,
    obj: Option<StrObj>,
}

#[derive(Debug, Clone, Default)]
pub struct StringTable {
    slots: Vec<StrSlot>,
    free_idx: Vec<u32>,
    /// 내용 → 슬롯 번호
    index: HashTable<u32, ()>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, s: &str) -> Option<Handle> {
        let slots = &self.slots;
        let (&ix, _) = self.index.get_key_value(hash_bytes(s.as_bytes()), |&ix| {
            slots[ix as usize].obj.as_ref().is_some_and(|o| &*o.text == s)
        })?;
        Some(Handle::new(ix, slots[ix as usize].generation))
    }

    /// 내용이 같은 문자열이 있으면 그 핸들을, 없으면 새로 만들어 돌려줍니다.
    pub fn intern(&mut self, s: &str) -> Handle {
        match self.find(s) {
            Some(h) => h,
            None => self.insert_new(s, hash_bytes(s.as_bytes())),
        }
    }

    fn insert_new(&mut self, s: &str, hash: u32) -> Handle {
        let obj = StrObj {
            text: s.into(),
            hash,
        };
        let ix = match self.free_idx.pop() {
            Some(ix) => {
                self.slots[ix as usize].obj = Some(obj);
                ix
            }
            None => {
                self.slots.push(StrSlot {
                    generation: 0,
                    marked: false,
                    obj: Some(obj),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.index.insert(hash, ix, (), |_| false);
        Handle::new(ix, self.slots[ix as usize].generation)
    }

    pub fn get(&self, h: Handle) -> Option<&StrObj> {
        let slot = self.slots.get(h.index as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        slot.obj.as_ref()
    }

    /// 세대 검사 없이 인덱스로 조회 (영구 테이블 전용)
    pub fn get_index(&self, index: u32) -> Option<&StrObj> {
        self.slots.get(index as usize)?.obj.as_ref()
    }

    /// 새로 마킹되었으면 true
    pub fn mark(&mut self, h: Handle) -> bool {
        match self.slots.get_mut(h.index as usize) {
            Some(slot) if slot.generation == h.generation && slot.obj.is_some() && !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    /// 마킹되지 않은 문자열을 해제하고 살아남은 문자열의 마크를 지웁니다.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (ix, slot) in self.slots.iter_mut().enumerate() {
            let Some(hash) = slot.obj.as_ref().map(|o| o.hash) else {
                continue;
            };
            if slot.marked {
                slot.marked = false;
                continue;
            }
            let ix = ix as u32;
            self.index.remove(hash, |&k| k == ix);
            slot.obj = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_idx.push(ix);
            freed += 1;
        }
        freed
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(ix, slot)| slot.obj.as_ref().map(|o| (ix as u32, &*o.text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut t = StringTable::new();
        let a = t.intern("hello");
        let b = t.intern("hello");
        let c = t.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(a).map(|o| &*o.text), Some("hello"));
    }

    #[test]
    fn test_sweep_frees_unmarked_and_reuses_slot() {
        let mut t = StringTable::new();
        let keep = t.intern("keep");
        let drop = t.intern("drop");
        assert!(t.mark(keep));
        assert!(!t.mark(keep));
        assert_eq!(t.sweep(), 1);
        assert!(t.get(drop).is_none());
        assert!(t.find("drop").is_none());
        assert_eq!(t.get(keep).map(|o| &*o.text), Some("keep"));

        // 마크는 지워졌으므로 다음 sweep에서 해제됨
        let again = t.intern("again");
        assert_eq!(again.index, drop.index);
        assert_ne!(again.generation, drop.generation);
        assert_eq!(t.sweep(), 2);
        assert!(t.is_empty());
    }

    #[test]
    fn test_hash_is_cached_at_creation() {
        let mut t = StringTable::new();
        let h = t.intern("abc");
        assert_eq!(t.get(h).map(|o| o.hash), Some(hash_bytes(b"abc")));
    }
}
