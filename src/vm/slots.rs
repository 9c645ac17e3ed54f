//! 이름 → 슬롯 번호 테이블
//!
//! 모듈 전역, 함수 지역 변수, 모듈 이름 목록이 모두 이 테이블을 씁니다. 슬롯 번호는
//! 삽입 순서대로 붙고 절대 바뀌지 않으므로 바이트코드 피연산자로 그대로 박아둘 수 있습니다.

use super::hash::{HashTable, hash_bytes};

#[derive(Debug, Clone)]
pub struct SlotTable<T> {
    index: HashTable<Box<str>, u32>,
    entries: Vec<(Box<str>, T)>,
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self {
            index: HashTable::new(),
            entries: Vec::new(),
        }
    }
}

impl<T> SlotTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이름이 있으면 값을 덮어쓰고, 없으면 새 슬롯을 붙입니다.
    pub fn set(&mut self, name: &str, value: T) -> u32 {
        if let Some(ix) = self.index_of(name) {
            self.entries[ix as usize].1 = value;
            return ix;
        }
        let ix = self.entries.len() as u32;
        self.index
            .insert(hash_bytes(name.as_bytes()), name.into(), ix, |k| &**k == name);
        self.entries.push((name.into(), value));
        ix
    }

    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.index
            .get(hash_bytes(name.as_bytes()), |k| &**k == name)
            .copied()
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.entries.get(index as usize).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.entries.get_mut(index as usize).map(|(_, v)| v)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.index_of(name).and_then(|ix| self.get(ix))
    }

    pub fn name(&self, index: u32) -> Option<&str> {
        self.entries.get(index as usize).map(|(n, _)| &**n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(n, v)| (&**n, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_follow_insertion_order() {
        let mut t = SlotTable::new();
        assert_eq!(t.set("a", 1), 0);
        assert_eq!(t.set("b", 2), 1);
        assert_eq!(t.set("c", 3), 2);
        assert_eq!(t.index_of("b"), Some(1));
        assert_eq!(t.name(2), Some("c"));
        assert_eq!(t.index_of("zz"), None);
    }

    #[test]
    fn test_set_overwrites_existing_name() {
        let mut t = SlotTable::new();
        t.set("x", 1);
        assert_eq!(t.set("x", 5), 0);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get_by_name("x"), Some(&5));
    }

    #[test]
    fn test_many_names() {
        let mut t = SlotTable::new();
        for i in 0..200 {
            t.set(&format!("v{i}"), i);
        }
        for i in 0..200 {
            assert_eq!(t.index_of(&format!("v{i}")), Some(i as u32));
        }
        if let Some(v) = t.get_mut(10) {
            *v = -1;
        }
        assert_eq!(t.get(10), Some(&-1));
    }
}
