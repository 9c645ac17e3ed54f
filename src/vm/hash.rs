//! perturbation probing을 쓰는 open-addressing 해시 테이블
//!
//! 테이블은 키를 직접 해시하거나 비교하지 않습니다. 호출자가 해시값과 비교 함수를 넘기므로
//! dict 키는 힙을 거쳐 문자열 내용을 비교하고, 심볼 테이블은 이름을 그대로 비교합니다.

const MIN_SIZE: usize = 8;
const PERTURB_SHIFT: u32 = 5;

#[derive(Debug, Clone)]
enum Node<K, V> {
    Empty,
    Deleted,
    Full { hash: u32, key: K, value: V },
}

#[derive(Debug, Clone)]
pub struct HashTable<K, V> {
    nodes: Vec<Node<K, V>>,
    mask: usize,
    /// 사용 중 + 삭제된 노드 수. 확장 기준
    used: usize,
    len: usize,
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

/// 문자열 해시: `h = first << 7; h = 1000003 * h ^ byte; h ^= len`
///
/// 0은 예약값이라 `u32::MAX`로 바꿉니다.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let Some(&first) = bytes.first() else {
        return u32::MAX;
    };
    let mut h = (first as u32) << 7;
    for &b in bytes {
        h = h.wrapping_mul(1_000_003) ^ b as u32;
    }
    h ^= bytes.len() as u32;
    if h == 0 { u32::MAX } else { h }
}

pub fn hash_int(i: i32) -> u32 {
    if i == 0 { u32::MAX } else { i as u32 }
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::with_capacity(MIN_SIZE)
    }
}

impl<K, V> HashTable<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 노드 수는 2의 거듭제곱으로 올림 (최소 8)
    pub fn with_capacity(capacity: usize) -> Self {
        let size = capacity.max(MIN_SIZE).next_power_of_two();
        Self {
            nodes: Self::empty_nodes(size),
            mask: size - 1,
            used: 0,
            len: 0,
        }
    }

    fn empty_nodes(size: usize) -> Vec<Node<K, V>> {
        let mut nodes = Vec::with_capacity(size);
        nodes.resize_with(size, || Node::Empty);
        nodes
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 노드 수 (항상 2의 거듭제곱)
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn mask(&self) -> usize {
        self.mask
    }

    /// 모든 항목을 지우고 노드 배열은 유지
    pub fn clear(&mut self) {
        for node in self.nodes.iter_mut() {
            *node = Node::Empty;
        }
        self.used = 0;
        self.len = 0;
    }

    /// 조회 한 번의 probe 횟수 상한
    pub fn max_probes(&self) -> usize {
        self.nodes.len()
    }

    fn probe(&self, hash: u32, mut eq: impl FnMut(&K) -> bool) -> Probe {
        let mut i = (hash as usize) & self.mask;
        let mut perturb = hash as usize;
        let mut first_deleted = None;

        for _ in 0..self.max_probes() {
            let pos = i & self.mask;
            match &self.nodes[pos] {
                Node::Empty => return Probe::Vacant(first_deleted.unwrap_or(pos)),
                Node::Deleted => {
                    first_deleted.get_or_insert(pos);
                }
                Node::Full { hash: h, key, .. } => {
                    if *h == hash && eq(key) {
                        return Probe::Found(pos);
                    }
                }
            }
            i = (i << 2).wrapping_add(i).wrapping_add(perturb).wrapping_add(1);
            perturb >>= PERTURB_SHIFT;
        }

        // 탐색 예산 소진: 선형 스캔으로 마무리
        self.scan(hash, eq, first_deleted)
    }

    fn scan(&self, hash: u32, mut eq: impl FnMut(&K) -> bool, first_deleted: Option<usize>) -> Probe {
        let mut vacant = first_deleted;
        for (pos, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Full { hash: h, key, .. } => {
                    if *h == hash && eq(key) {
                        return Probe::Found(pos);
                    }
                }
                _ => {
                    vacant.get_or_insert(pos);
                }
            }
        }
        // used*3 <= size*2 이면 빈 노드가 항상 있음
        Probe::Vacant(vacant.unwrap_or(0))
    }

    pub fn find(&self, hash: u32, eq: impl FnMut(&K) -> bool) -> Option<usize> {
        match self.probe(hash, eq) {
            Probe::Found(pos) => Some(pos),
            Probe::Vacant(_) => None,
        }
    }

    pub fn get(&self, hash: u32, eq: impl FnMut(&K) -> bool) -> Option<&V> {
        let pos = self.find(hash, eq)?;
        match &self.nodes[pos] {
            Node::Full { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn get_key_value(&self, hash: u32, eq: impl FnMut(&K) -> bool) -> Option<(&K, &V)> {
        let pos = self.find(hash, eq)?;
        match &self.nodes[pos] {
            Node::Full { key, value, .. } => Some((key, value)),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, hash: u32, eq: impl FnMut(&K) -> bool) -> Option<&mut V> {
        let pos = self.find(hash, eq)?;
        match &mut self.nodes[pos] {
            Node::Full { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, hash: u32, eq: impl FnMut(&K) -> bool) -> bool {
        self.find(hash, eq).is_some()
    }

    /// 삽입 또는 덮어쓰기. 키가 있었으면 이전 값을 돌려줌
    pub fn insert(&mut self, hash: u32, key: K, value: V, eq: impl FnMut(&K) -> bool) -> Option<V> {
        match self.probe(hash, eq) {
            Probe::Found(pos) => match &mut self.nodes[pos] {
                Node::Full { value: slot, .. } => Some(std::mem::replace(slot, value)),
                _ => None,
            },
            Probe::Vacant(pos) => {
                if matches!(self.nodes[pos], Node::Empty) {
                    self.used += 1;
                }
                self.nodes[pos] = Node::Full { hash, key, value };
                self.len += 1;
                if self.used * 3 > self.capacity() * 2 {
                    self.grow();
                }
                None
            }
        }
    }

    pub fn remove(&mut self, hash: u32, eq: impl FnMut(&K) -> bool) -> Option<(K, V)> {
        let pos = self.find(hash, eq)?;
        match std::mem::replace(&mut self.nodes[pos], Node::Deleted) {
            Node::Full { key, value, .. } => {
                self.len -= 1;
                Some((key, value))
            }
            other => {
                self.nodes[pos] = other;
                None
            }
        }
    }

    fn grow(&mut self) {
        // 삭제 표시가 대부분이면 같은 크기로 재배치만 한다
        let new_size = if self.len * 3 > self.capacity() {
            self.capacity() << 1
        } else {
            self.capacity()
        };
        let old = std::mem::replace(&mut self.nodes, Self::empty_nodes(new_size));
        self.mask = new_size - 1;
        self.used = 0;
        self.len = 0;
        for node in old {
            if let Node::Full { hash, key, value } = node {
                let pos = match self.probe(hash, |_| false) {
                    Probe::Vacant(pos) | Probe::Found(pos) => pos,
                };
                self.nodes[pos] = Node::Full { hash, key, value };
                self.used += 1;
                self.len += 1;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Full { key, value, .. } => Some((key, value)),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.nodes.iter_mut().filter_map(|n| match n {
            Node::Full { key, value, .. } => Some((&*key, value)),
            _ => None,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}
