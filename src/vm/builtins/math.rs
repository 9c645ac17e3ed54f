//! `math` 네이티브 모듈
//!
//! ```text
//! import "math" as m;
//! println(m:randint(1, 6));
//! println(m:pi);
//! ```

use std::cell::Cell;
use std::rc::Rc;

use super::{expect_args, int_arg, native_error};
use crate::vm::machine::{Vm, VmResult};
use crate::vm::native::{ExternalCallable, NativeModule};
use crate::vm::value::{ModuleId, Value};

pub const PI: f32 = 3.141_592_7;

#[derive(Debug, Default)]
pub struct MathModule;

impl NativeModule for MathModule {
    fn name(&self) -> &str {
        "math"
    }

    fn import(&self, vm: &mut Vm, module: ModuleId) -> VmResult<()> {
        let randint = vm.register_external(Rc::new(RandInt::from_clock()));
        vm.reg_value(module, "randint", randint)?;
        vm.reg_float(module, "pi", PI)?;
        Ok(())
    }
}

/// randint(a, b): a 이상 b 이하의 정수 (xorshift32)
#[derive(Debug)]
pub struct RandInt {
    state: Cell<u32>,
}

impl RandInt {
    pub fn with_seed(seed: u32) -> Self {
        // 0은 xorshift의 고정점
        Self {
            state: Cell::new(if seed == 0 { 0x9E37_79B9 } else { seed }),
        }
    }

    fn from_clock() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
            .unwrap_or(0);
        Self::with_seed(nanos)
    }

    fn next(&self) -> u32 {
        let mut x = self.state.get();
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state.set(x);
        x
    }

    pub fn range(&self, start: i32, end: i32) -> i32 {
        let span = (end as i64 - start as i64 + 1) as u64;
        (start as i64 + (self.next() as u64 % span) as i64) as i32
    }
}

impl ExternalCallable for RandInt {
    fn name(&self) -> &str {
        "randint"
    }

    fn call(&self, vm: &mut Vm) -> VmResult<Value> {
        expect_args(vm, "randint", 2)?;
        let start = int_arg(vm, "randint", 1)?;
        let end = int_arg(vm, "randint", 2)?;
        if start > end {
            return Err(native_error(
                "randint",
                format!("empty range {}..={}", start, end),
            ));
        }
        Ok(Value::Int(self.range(start, end)))
    }
}
