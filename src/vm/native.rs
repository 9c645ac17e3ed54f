//! 네이티브 확장 인터페이스
//!
//! 동적 라이브러리 대신 호스트가 플러그인 객체를 이름으로 등록합니다. 스크립트가
//! `import "name"`을 실행하면 같은 이름의 플러그인이 새 모듈의 전역 테이블을 채웁니다.

use super::machine::{Vm, VmResult};
use super::value::{ModuleId, Value};

/// 이름으로 import 되는 네이티브 모듈
pub trait NativeModule {
    fn name(&self) -> &str;

    /// 모듈 `module`의 전역 테이블에 함수/상수를 등록
    fn import(&self, vm: &mut Vm, module: ModuleId) -> VmResult<()>;

    /// 런타임 종료 시 호출
    fn close(&self, _vm: &mut Vm, _module: ModuleId) {}
}

/// 상태를 가진 호출 가능 객체. 스크립트에는 `Value::Ext`로 보입니다.
pub trait ExternalCallable {
    fn name(&self) -> &str;

    /// 인자는 `vm.arg(1..=vm.param_count())`
    fn call(&self, vm: &mut Vm) -> VmResult<Value>;
}
