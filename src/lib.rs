pub mod builtins;
pub mod config;
pub mod lexer;
#[cfg(not(target_arch = "wasm32"))]
pub mod repl;
pub mod runtime;
pub mod runtime_io;
pub mod vm;

use std::path::PathBuf;

use ariadne::{Color, Label, Report, ReportKind, Source};

pub use config::Config;
pub use runtime::{ExecStatus, Matrix, MatrixResult};
pub use runtime_io::{BufferIo, RuntimeIo, StdIo};
pub use vm::{CompileError, CompileErrorKind, ModuleId, Value, ValueType, VmError, VmErrorKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 크레이트 최상위 오류
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] VmError),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Image(String),
}

impl From<vm::image::ImageError> for MatrixError {
    fn from(e: vm::image::ImageError) -> Self {
        match e {
            vm::image::ImageError::Vm(e) => MatrixError::Runtime(e),
            other => MatrixError::Image(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub span: std::ops::Range<usize>,
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        Self {
            message: e.message.clone(),
            span: e.span.clone(),
        }
    }
}

impl Diagnostic {
    pub fn format(&self, path: &str, src: &str, kind: &str, code: usize) -> String {
        let mut buffer = Vec::new();
        Report::build(ReportKind::Error, (path, self.span.clone()))
            .with_config(ariadne::Config::new().with_index_type(ariadne::IndexType::Byte))
            .with_code(code)
            .with_message(kind)
            .with_label(
                Label::new((path, self.span.clone()))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((path, Source::from(src)), &mut buffer)
            .ok();
        String::from_utf8_lossy(&buffer).to_string()
    }
}

/// 컴파일 오류를 소스와 함께 보기 좋게 렌더링
pub fn render_compile_error(e: &CompileError, src: &str) -> String {
    let (kind, code) = match e.kind {
        CompileErrorKind::Lex => ("Lexing failed", 1),
        CompileErrorKind::Syntax | CompileErrorKind::Incomplete => ("Parsing failed", 2),
        CompileErrorKind::Semantic => ("Semantic analysis failed", 3),
    };
    // 입력 끝 오류는 빈 span이라 마지막 글자를 가리킴
    let mut diag = Diagnostic::from(e);
    if diag.span.is_empty() {
        let start = src.char_indices().next_back().map_or(0, |(i, _)| i);
        diag.span = start..src.len();
    }
    diag.format(&e.file, src, kind, code)
}

/// 사용자에게 보여줄 오류 문자열. 컴파일 오류는 소스가 있으면 ariadne로 렌더링합니다.
pub fn report_error(e: &MatrixError, src: Option<&str>) -> String {
    match (e, src) {
        (MatrixError::Compile(c), Some(src)) => render_compile_error(c, src),
        (e, _) => e.to_string(),
    }
}
