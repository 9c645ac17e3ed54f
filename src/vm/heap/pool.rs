//! 크기 등급별 객체 풀
//!
//! 리스트와 딕셔너리는 용량 8/16/32 등급의 free list에서 꺼내 쓰고, 그보다 큰 요청은
//! 정확한 용량으로 따로 할당합니다. sweep은 사용 중 목록을 한 번만 훑으며 마킹되지 않은
//! 객체를 자기 등급의 free list로 돌려보냅니다.

use crate::vm::value::Handle;

pub const SIZE_CLASSES: [usize; 3] = [8, 16, 32];
const REFILL_BATCH: usize = 32;

/// 풀에 들어갈 수 있는 객체
pub trait Poolable {
    fn with_capacity(capacity: usize) -> Self;
    fn capacity(&self) -> usize;
    /// 내용을 비우되 확보된 용량은 유지
    fn reset(&mut self);
}

/// 요청 크기를 담을 수 있는 가장 작은 등급
pub fn class_for_request(n: usize) -> Option<usize> {
    SIZE_CLASSES.iter().position(|&c| n <= c)
}

/// 반납된 객체가 들어갈 수 있는 가장 큰 등급
fn class_for_capacity(capacity: usize) -> Option<usize> {
    SIZE_CLASSES.iter().rposition(|&c| capacity >= c)
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    marked: bool,
    object: Option<T>,
}

#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free: [Vec<T>; 3],
    vacant: Vec<u32>,
    used: Vec<u32>,
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: [Vec::new(), Vec::new(), Vec::new()],
            vacant: Vec::new(),
            used: Vec::new(),
        }
    }
}

fn release<T: Poolable>(free: &mut [Vec<T>; 3], mut object: T) {
    // 큰 등급 객체는 그냥 버림
    if let Some(class) = class_for_capacity(object.capacity()) {
        if object.capacity() <= SIZE_CLASSES[SIZE_CLASSES.len() - 1] {
            object.reset();
            free[class].push(object);
        }
    }
}

impl<T: Poolable> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_object(&mut self, n: usize) -> T {
        let Some(class) = class_for_request(n) else {
            return T::with_capacity(n);
        };
        let list = &mut self.free[class];
        if list.is_empty() {
            list.extend((0..REFILL_BATCH).map(|_| T::with_capacity(SIZE_CLASSES[class])));
        }
        match list.pop() {
            Some(obj) => obj,
            None => T::with_capacity(SIZE_CLASSES[class]),
        }
    }

    /// 용량이 `n` 이상인 빈 객체를 할당합니다.
    pub fn alloc(&mut self, n: usize) -> Handle {
        let object = self.take_object(n);
        let index = match self.vacant.pop() {
            Some(ix) => {
                self.slots[ix as usize].object = Some(object);
                ix
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    marked: false,
                    object: Some(object),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.used.push(index);
        Handle::new(index, self.slots[index as usize].generation)
    }

    fn slot(&self, h: Handle) -> Option<&Slot<T>> {
        self.slots
            .get(h.index as usize)
            .filter(|s| s.generation == h.generation)
    }

    pub fn get(&self, h: Handle) -> Option<&T> {
        self.slot(h)?.object.as_ref()
    }

    pub fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(h.index as usize)
            .filter(|s| s.generation == h.generation)?
            .object
            .as_mut()
    }

    /// 새로 마킹되었으면 true
    pub fn mark(&mut self, h: Handle) -> bool {
        match self.slots.get_mut(h.index as usize) {
            Some(s) if s.generation == h.generation && s.object.is_some() && !s.marked => {
                s.marked = true;
                true
            }
            _ => false,
        }
    }

    /// 마킹되지 않은 객체를 풀로 돌려보내고 해제 개수를 돌려줍니다.
    pub fn sweep(&mut self) -> usize {
        let slots = &mut self.slots;
        let free = &mut self.free;
        let vacant = &mut self.vacant;
        let before = self.used.len();
        self.used.retain(|&ix| {
            let slot = &mut slots[ix as usize];
            if slot.marked {
                slot.marked = false;
                return true;
            }
            if let Some(object) = slot.object.take() {
                release(free, object);
            }
            slot.generation = slot.generation.wrapping_add(1);
            vacant.push(ix);
            false
        });
        before - self.used.len()
    }

    pub fn live(&self) -> usize {
        self.used.len()
    }

    pub fn free_count(&self, class: usize) -> usize {
        self.free.get(class).map_or(0, Vec::len)
    }
}
