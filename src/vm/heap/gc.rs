//! Mark-sweep 수집기
//!
//! 명시적인 worklist로 마킹합니다. 이미 mark bit가 선 객체는 건너뛰므로 순환 참조도 끝납니다.

use log::debug;

use super::Heap;
use crate::vm::value::{Key, Place, StrRef, Value};

/// 한 번의 수집에서 해제된 객체 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub strings: usize,
    pub lists: usize,
    pub dicts: usize,
}

impl GcStats {
    pub fn total(&self) -> usize {
        self.strings + self.lists + self.dicts
    }
}

impl Heap {
    /// `roots`에서 닿는 객체를 마킹한 뒤 세 GC 공간을 모두 sweep
    pub fn collect(&mut self, roots: impl IntoIterator<Item = Value>) -> GcStats {
        let mut work: Vec<Value> = roots.into_iter().collect();
        while let Some(v) = work.pop() {
            self.mark_one(v, &mut work);
        }

        let stats = GcStats {
            strings: self.strings.sweep(),
            lists: self.lists.sweep(),
            dicts: self.dicts.sweep(),
        };
        debug!(
            "gc: freed {} strings, {} lists, {} dicts ({} lists, {} dicts live)",
            stats.strings,
            stats.lists,
            stats.dicts,
            self.lists.live(),
            self.dicts.live()
        );
        stats
    }

    fn mark_one(&mut self, v: Value, work: &mut Vec<Value>) {
        match v {
            Value::Str(StrRef::Heap(h)) => {
                self.strings.mark(h);
            }
            Value::List(h) => {
                if self.lists.mark(h) {
                    if let Some(list) = self.lists.get(h) {
                        work.extend(list.items.iter().copied());
                    }
                }
            }
            Value::Dict(h) => {
                if self.dicts.mark(h) {
                    if let Some(dict) = self.dicts.get(h) {
                        for (k, v) in dict.table.iter() {
                            work.push(k.to_value());
                            work.push(*v);
                        }
                    }
                }
            }
            Value::Ref(place) => match place {
                Place::ListItem { list, .. } => work.push(Value::List(list)),
                Place::DictEntry { dict, key } => {
                    work.push(Value::Dict(dict));
                    if let Key::Str(s) = key {
                        work.push(Value::Str(s));
                    }
                }
                Place::Global { .. } | Place::Stack(_) => {}
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_objects_are_freed() {
        let mut heap = Heap::new();
        let s = heap.new_string("temp");
        let l = heap.alloc_list(vec![Value::Str(s)]);
        let d = heap.alloc_dict(0);
        let stats = heap.collect([]);
        assert_eq!(stats, GcStats { strings: 1, lists: 1, dicts: 1 });
        assert!(heap.list(l).is_err());
        assert!(heap.dict(d).is_err());
        assert!(heap.str(s).is_err());
    }

    #[test]
    fn test_reachable_objects_survive_with_content() {
        let mut heap = Heap::new();
        let s = heap.new_string("kept");
        let inner = heap.alloc_list(vec![Value::Str(s), Value::Int(7)]);
        let d = heap.alloc_dict(1);
        let key = heap.new_string("key");
        assert!(heap.dict_set(d, Key::Str(key), Value::List(inner)).is_ok());

        let stats = heap.collect([Value::Dict(d)]);
        assert_eq!(stats.total(), 0);
        assert_eq!(heap.str(s).ok(), Some("kept"));
        assert_eq!(heap.str(key).ok(), Some("key"));
        assert!(matches!(heap.list(inner), Ok(l) if l.items[1] == Value::Int(7)));

        // 마크가 지워졌으므로 루트 없이 돌리면 모두 해제
        let stats = heap.collect([]);
        assert_eq!(stats, GcStats { strings: 2, lists: 1, dicts: 1 });
    }

    #[test]
    fn test_cycles_terminate() {
        let mut heap = Heap::new();
        let a = heap.alloc_list(vec![]);
        let b = heap.alloc_list(vec![Value::List(a)]);
        if let Ok(list) = heap.list_mut(a) {
            list.items.push(Value::List(b));
            list.items.push(Value::List(a));
        }
        let stats = heap.collect([Value::List(a)]);
        assert_eq!(stats.lists, 0);
        let stats = heap.collect([]);
        assert_eq!(stats.lists, 2);
    }

    #[test]
    fn test_freed_slot_is_reused_by_same_class() {
        let mut heap = Heap::new();
        let keep = heap.alloc_list(vec![Value::Int(1)]);
        let gone = heap.alloc_list(vec![Value::Int(2)]);
        heap.collect([Value::List(keep)]);
        let next = heap.alloc_list(vec![Value::Int(3)]);
        assert_eq!(next.index, gone.index);
        assert!(heap.list(gone).is_err());
        assert!(matches!(heap.list(next), Ok(l) if l.items == vec![Value::Int(3)]));
    }

    #[test]
    fn test_ref_place_keeps_container_alive() {
        let mut heap = Heap::new();
        let l = heap.alloc_list(vec![Value::Int(1)]);
        let r = Value::Ref(Place::ListItem { list: l, index: 0 });
        assert_eq!(heap.collect([r]).lists, 0);
    }
}
