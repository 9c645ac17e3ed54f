//! 런타임 값 모델
//!
//! 모든 값은 `Copy` 가능한 작은 태그 값입니다. 문자열/리스트/딕셔너리는 힙 arena에 살고,
//! 값은 세대 번호가 붙은 [`Handle`]만 들고 다닙니다. 해제된 슬롯을 가리키는 핸들은
//! 세대 검사에서 걸러지므로 dangling 참조가 조용히 재사용된 객체를 읽는 일은 없습니다.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::machine::{Vm, VmResult};

pub type ModuleId = u32;

/// 네이티브 함수 포인터
///
/// 인자는 `vm.arg(1..=vm.param_count())`로 위치 기반으로 읽고, 결과 값을 돌려주면
/// VM이 호출 위치(callee 슬롯)에 덮어씁니다.
pub type NativeFn = fn(&mut Vm) -> VmResult<Value>;

/// Generation-checked index into a heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub index: u32,
    pub generation: u32,
}

impl Handle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// 문자열 참조: 영구 테이블(바이트코드 상수, 식별자) 또는 GC 테이블
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrRef {
    Const(u32),
    Heap(Handle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncRef {
    pub module: ModuleId,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtRef(pub u32);

/// Dict key. Only ints and strings hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i32),
    Str(StrRef),
}

impl Key {
    pub fn from_value(v: Value) -> Option<Key> {
        match v {
            Value::Int(i) => Some(Key::Int(i)),
            Value::Str(s) => Some(Key::Str(s)),
            _ => None,
        }
    }

    pub fn to_value(self) -> Value {
        match self {
            Key::Int(i) => Value::Int(i),
            Key::Str(s) => Value::Str(s),
        }
    }
}

/// 주소 지정 결과: 값이 저장된 위치 (lvalue)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Place {
    Global { module: ModuleId, slot: u32 },
    Stack(usize),
    ListItem { list: Handle, index: u32 },
    DictEntry { dict: Handle, key: Key },
}

#[derive(Debug, Clone, Copy)]
pub enum Value {
    None,
    Int(i32),
    Real(f32),
    Str(StrRef),
    List(Handle),
    Dict(Handle),
    Func(FuncRef),
    Native(NativeFn),
    Module(ModuleId),
    Ref(Place),
    Ext(ExtRef),
    /// 컴파일 시점에 이름만 예약된 슬롯
    Dummy,
    /// 호출 시 예약됐지만 아직 쓰이지 않은 지역 변수 슬롯
    Uninit,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => std::ptr::fn_addr_eq(*a, *b),
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Ext(a), Value::Ext(b)) => a == b,
            (Value::Dummy, Value::Dummy) => true,
            (Value::Uninit, Value::Uninit) => true,
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

/// Tag of a value as seen by the embedding API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    None,
    Int,
    Real,
    String,
    List,
    Dict,
    Function,
    Native,
    Module,
    Ref,
    Ext,
    Dummy,
    Uninit,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::None => ValueType::None,
            Value::Int(_) => ValueType::Int,
            Value::Real(_) => ValueType::Real,
            Value::Str(_) => ValueType::String,
            Value::List(_) => ValueType::List,
            Value::Dict(_) => ValueType::Dict,
            Value::Func(_) => ValueType::Function,
            Value::Native(_) => ValueType::Native,
            Value::Module(_) => ValueType::Module,
            Value::Ref(_) => ValueType::Ref,
            Value::Ext(_) => ValueType::Ext,
            Value::Dummy => ValueType::Dummy,
            Value::Uninit => ValueType::Uninit,
        }
    }

    /// `none`만 거짓
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::None)
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Dummy | Value::Uninit)
    }

    pub fn from_bool(b: bool) -> Value {
        if b { Value::Int(1) } else { Value::None }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_native(_vm: &mut Vm) -> VmResult<Value> {
        Ok(Value::None)
    }

    #[test]
    fn test_only_none_is_falsy() {
        assert!(!Value::None.is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::Real(0.0).is_truthy());
        assert!(Value::Str(StrRef::Const(0)).is_truthy());
    }

    #[test]
    fn test_value_equality_is_tag_sensitive() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Real(3.0));
        assert_eq!(Value::Native(dummy_native), Value::Native(dummy_native));
        let h = Handle::new(1, 0);
        assert_ne!(Value::List(h), Value::List(Handle::new(1, 1)));
    }

    #[test]
    fn test_key_conversion() {
        assert_eq!(Key::from_value(Value::Int(5)), Some(Key::Int(5)));
        assert_eq!(Key::from_value(Value::Real(1.0)), None);
        assert_eq!(Key::from_value(Value::None), None);
        assert_eq!(Key::Int(5).to_value(), Value::Int(5));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Int(1).value_type().to_string(), "int");
        assert_eq!(Value::Str(StrRef::Const(0)).value_type().to_string(), "string");
        assert_eq!(Value::None.value_type().to_string(), "none");
    }
}
