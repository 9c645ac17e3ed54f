//! VM 유틸리티 함수
//!
//! Value 표시, 동등성 비교, 타입 변환 등 VM과 builtin에서 공통으로 쓰는 헬퍼 함수들입니다.

use super::heap::Heap;
use super::machine::{Vm, VmErrorKind, VmResult, err};
use super::value::{Handle, StrRef, Value};

/// Value를 출력 가능한 문자열로 변환
///
/// 최상위 문자열은 그대로, 컨테이너 안의 문자열은 따옴표로 감쌉니다.
///
/// # Examples
///
/// ```ignore
/// display_value(&vm, Value::Int(42))     // → "42"
/// display_value(&vm, Value::Real(1.5))   // → "1.500000"
/// display_value(&vm, Value::None)        // → "none"
/// ```
pub fn display_value(vm: &Vm, v: Value) -> String {
    let mut out = String::new();
    let mut seen = Vec::new();
    write_value(vm, v, false, &mut seen, &mut out);
    out
}

fn write_value(vm: &Vm, v: Value, quoted: bool, seen: &mut Vec<Handle>, out: &mut String) {
    use std::fmt::Write;
    match v {
        Value::None => out.push_str("none"),
        Value::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        Value::Real(f) => {
            let _ = write!(out, "{:.6}", f);
        }
        Value::Str(s) => {
            let text = vm.heap.str(s).unwrap_or("<collected>");
            if quoted {
                let _ = write!(out, "\"{}\"", text);
            } else {
                out.push_str(text);
            }
        }
        Value::List(h) => {
            // 순환 참조는 [...]로 표시
            if seen.contains(&h) {
                out.push_str("[...]");
                return;
            }
            let Ok(list) = vm.heap.list(h) else {
                out.push_str("<collected>");
                return;
            };
            seen.push(h);
            out.push('[');
            for (i, item) in list.items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(vm, *item, true, seen, out);
            }
            out.push(']');
            seen.pop();
        }
        Value::Dict(h) => {
            if seen.contains(&h) {
                out.push_str("{...}");
                return;
            }
            let Ok(entries) = vm.heap.dict_entries(h) else {
                out.push_str("<collected>");
                return;
            };
            seen.push(h);
            out.push('{');
            for (i, (k, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(vm, k.to_value(), true, seen, out);
                out.push_str(": ");
                write_value(vm, val, true, seen, out);
            }
            out.push('}');
            seen.pop();
        }
        Value::Func(f) => match vm.function(f) {
            Ok(func) => {
                let _ = write!(out, "<func {}>", func.name);
            }
            Err(_) => out.push_str("<func>"),
        },
        Value::Native(_) => out.push_str("<native>"),
        Value::Module(m) => match vm.module(m) {
            Ok(md) => {
                let _ = write!(out, "<module {}>", md.name);
            }
            Err(_) => out.push_str("<module>"),
        },
        Value::Ref(_) => out.push_str("<ref>"),
        Value::Ext(r) => match vm.external(r) {
            Some(ext) => {
                let _ = write!(out, "<ext {}>", ext.name());
            }
            None => out.push_str("<ext>"),
        },
        Value::Dummy | Value::Uninit => out.push_str("<undefined>"),
    }
}

/// `==` 비교: 태그가 다르면 다름, 문자열은 내용, 힙 객체와 함수는 identity
pub fn compare_eq(heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => heap.str_eq(x, y),
        _ => a == b,
    }
}

/// int 변환: real은 버림, 문자열은 앞쪽 정수 부분 (없으면 0)
pub fn to_int(heap: &Heap, v: Value) -> VmResult<i32> {
    match v {
        Value::Int(i) => Ok(i),
        Value::Real(f) => Ok(f as i32),
        Value::Str(s) => Ok(parse_leading_int(heap.str(s)?)),
        other => Err(err(
            VmErrorKind::TypeError,
            format!("Cannot convert {} to int.", other.value_type()),
        )),
    }
}

/// real 변환: int는 확장, 문자열은 앞쪽 실수 부분 (없으면 0.0)
pub fn to_real(heap: &Heap, v: Value) -> VmResult<f32> {
    match v {
        Value::Int(i) => Ok(i as f32),
        Value::Real(f) => Ok(f),
        Value::Str(s) => Ok(parse_leading_real(heap.str(s)?)),
        other => Err(err(
            VmErrorKind::TypeError,
            format!("Cannot convert {} to float.", other.value_type()),
        )),
    }
}

/// 문자열 변환. 결과는 GC 테이블에 들어갑니다.
pub fn to_str(heap: &mut Heap, v: Value) -> VmResult<StrRef> {
    let text = match v {
        Value::Str(s) => return Ok(s),
        Value::Int(i) => i.to_string(),
        Value::Real(f) => format!("{:.6}", f),
        other => {
            return Err(err(
                VmErrorKind::TypeError,
                format!("Cannot convert {} to string.", other.value_type()),
            ));
        }
    };
    Ok(heap.new_string(&text))
}

fn leading_number(s: &str, allow_real: bool) -> &str {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if allow_real {
        if bytes.get(end) == Some(&b'.') {
            end += 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
        if end > digits_start && matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut e = end + 1;
            if matches!(bytes.get(e), Some(b'+' | b'-')) {
                e += 1;
            }
            let exp_digits = e;
            while e < bytes.len() && bytes[e].is_ascii_digit() {
                e += 1;
            }
            if e > exp_digits {
                end = e;
            }
        }
    }
    &s[..end]
}

/// `atoi` 규칙: 앞쪽 공백 무시, 부호 하나, 숫자가 끝나는 곳까지. 넘치면 wrap
pub fn parse_leading_int(s: &str) -> i32 {
    let num = leading_number(s, false);
    let (neg, digits) = match num.as_bytes().first() {
        Some(b'-') => (true, &num[1..]),
        Some(b'+') => (false, &num[1..]),
        _ => (false, num),
    };
    let v = digits
        .bytes()
        .fold(0i32, |acc, d| acc.wrapping_mul(10).wrapping_add((d - b'0') as i32));
    if neg { v.wrapping_neg() } else { v }
}

/// `atof` 규칙
pub fn parse_leading_real(s: &str) -> f32 {
    leading_number(s, true).parse().unwrap_or(0.0)
}
