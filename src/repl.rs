//! Matrix REPL (Read-Eval-Print Loop)
//!
//! 입력 줄을 버퍼에 모았다가 문장이 완성되면 REPL 모듈의 최상위 코드로 실행합니다.
//! 전역 변수와 함수 정의는 모듈에 누적됩니다.

use std::path::PathBuf;

use log::warn;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::runtime::{ExecStatus, Matrix};
use crate::vm::ModuleId;
use crate::vm::utils::display_value;
use crate::{VERSION, report_error};

pub const PROMPT: &str = ">> ";
pub const CONTINUE_PROMPT: &str = ".. ";

const REPL_MODULE: &str = "repl";

/// 한 줄을 넣은 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// 버퍼가 실행되었음
    Done,
    /// 문장이 끝나지 않아 다음 줄이 필요함
    NeedMore,
    /// 오류 메시지. 버퍼는 비워짐
    Error(String),
}

/// REPL 세션 상태
pub struct ReplState {
    pub matrix: Matrix,
    pub module: ModuleId,
    buffer: String,
}

impl ReplState {
    pub fn new() -> Self {
        Self::with_matrix(Matrix::new())
    }

    pub fn with_matrix(mut matrix: Matrix) -> Self {
        let module = matrix.add_module(REPL_MODULE);
        Self {
            matrix,
            module,
            buffer: String::new(),
        }
    }

    pub fn prompt(&self) -> &'static str {
        if self.buffer.is_empty() {
            PROMPT
        } else {
            CONTINUE_PROMPT
        }
    }

    pub fn is_continuing(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// 입력 중인 문장을 버림
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn feed(&mut self, line: &str) -> Feed {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return Feed::Done;
        }

        match self.matrix.exec_str(self.module, &self.buffer) {
            Ok(ExecStatus::Incomplete) => Feed::NeedMore,
            Ok(ExecStatus::Done) => {
                self.buffer.clear();
                Feed::Done
            }
            Err(e) => {
                let message = report_error(&e, Some(&self.buffer));
                self.buffer.clear();
                Feed::Error(message)
            }
        }
    }

    /// 사용자가 정의한 전역 (builtin 제외)
    pub fn globals(&self) -> Vec<String> {
        let vm = self.matrix.vm();
        let Ok(module) = vm.module(self.module) else {
            return Vec::new();
        };
        module
            .globals
            .iter()
            .filter(|(name, v)| {
                v.is_defined() && crate::builtins::lookup(name).is_none()
            })
            .map(|(name, v)| format!("{} = {}", name, display_value(vm, *v)))
            .collect()
    }

    pub fn functions(&self) -> Vec<String> {
        match self.matrix.vm().module(self.module) {
            Ok(module) => module
                .functions
                .iter()
                .map(|f| format!("{}(arity: {})", f.name, f.arity))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for ReplState {
    fn default() -> Self {
        Self::new()
    }
}

/// 특수 명령어 처리
///
/// 반환값: true이면 REPL 종료
pub fn handle_command(cmd: &str, state: &mut ReplState) -> Result<bool, String> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    let Some(&first) = parts.first() else {
        return Ok(false);
    };

    match first {
        ":quit" | ":q" => Ok(true),
        ":help" | ":h" => {
            print_help();
            Ok(false)
        }
        ":clear" | ":c" => {
            *state = ReplState::new();
            println!("Session cleared.");
            Ok(false)
        }
        ":globals" | ":g" => {
            let globals = state.globals();
            if globals.is_empty() {
                println!("No globals defined.");
            }
            for g in globals {
                println!("  {}", g);
            }
            Ok(false)
        }
        ":functions" | ":f" => {
            let functions = state.functions();
            if functions.is_empty() {
                println!("No functions defined.");
            }
            for f in functions {
                println!("  {}", f);
            }
            Ok(false)
        }
        ":disasm" | ":d" => {
            state
                .matrix
                .disasm(state.module, |line| println!("{}", line))
                .map_err(|e| e.to_string())?;
            Ok(false)
        }
        _ => Err(format!("Unknown command: {}", first)),
    }
}

fn print_help() {
    println!(
        r#"Matrix REPL Commands:
  :quit, :q          Exit the REPL
  :help, :h          Show this help
  :clear, :c         Clear all definitions
  :globals, :g       List defined globals
  :functions, :f     List defined functions
  :disasm, :d        Disassemble the session module

Tips:
  - Unfinished statements continue on the next line ('{}')
  - Ctrl+C discards the current statement, Ctrl+D exits"#,
        CONTINUE_PROMPT.trim_end()
    );
}

fn history_path() -> Option<PathBuf> {
    let dir = dirs::data_dir()?.join("matrix-script");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir.join("history.txt"))
}

/// 대화형 세션 실행
pub fn run() -> rustyline::Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        // 첫 실행에는 파일이 없음
        let _ = rl.load_history(path);
    }

    println!("Matrix Script {} (type :help for commands)", VERSION);
    let mut state = ReplState::new();

    loop {
        match rl.readline(state.prompt()) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.as_str());
                }
                if !state.is_continuing() && line.trim_start().starts_with(':') {
                    match handle_command(&line, &mut state) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("{}", e),
                    }
                    continue;
                }
                if let Feed::Error(message) = state.feed(&line) {
                    eprintln!("{}", message);
                }
            }
            Err(ReadlineError::Interrupted) => {
                if state.is_continuing() {
                    state.reset();
                } else {
                    println!("(Ctrl+D to exit)");
                }
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        }
    }

    state.matrix.close();
    if let Some(path) = &history {
        if let Err(e) = rl.save_history(path) {
            warn!("cannot save history to {}: {}", path.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_io::BufferIo;

    fn session() -> (ReplState, BufferIo) {
        let io = BufferIo::new();
        let state = ReplState::with_matrix(Matrix::with_io(Box::new(io.clone())));
        (state, io)
    }

    #[test]
    fn test_state_persists_between_lines() {
        let (mut state, io) = session();
        assert_eq!(state.feed("x = 10;"), Feed::Done);
        assert_eq!(state.feed("println(x + 5);"), Feed::Done);
        assert_eq!(io.get_output(), "15\n");
    }

    #[test]
    fn test_incomplete_then_complete() {
        let (mut state, io) = session();
        assert_eq!(state.prompt(), PROMPT);
        assert_eq!(state.feed("if (1) {"), Feed::NeedMore);
        assert_eq!(state.prompt(), CONTINUE_PROMPT);
        assert_eq!(state.feed("  println(\"yes\");"), Feed::NeedMore);
        assert_eq!(state.feed("}"), Feed::Done);
        assert_eq!(state.prompt(), PROMPT);
        assert_eq!(io.get_output(), "yes\n");
    }

    #[test]
    fn test_function_definition_and_call() {
        let (mut state, io) = session();
        assert_eq!(state.feed("def add(a, b) {"), Feed::NeedMore);
        assert_eq!(state.feed("return a + b; }"), Feed::Done);
        assert_eq!(state.feed("println(add(10, 20));"), Feed::Done);
        assert_eq!(io.get_output(), "30\n");
        assert_eq!(state.functions(), vec!["add(arity: 2)".to_string()]);
    }

    #[test]
    fn test_error_recovery() {
        let (mut state, io) = session();
        assert!(matches!(state.feed("x = = 10;"), Feed::Error(_)));
        assert!(!state.is_continuing());
        assert_eq!(state.feed("x = 10;"), Feed::Done);

        assert!(matches!(state.feed("y = x / 0;"), Feed::Error(m) if m.contains("Division by zero.")));
        assert_eq!(state.feed("println(x);"), Feed::Done);
        assert_eq!(io.get_output(), "10\n");
    }

    #[test]
    fn test_blank_line() {
        let (mut state, _) = session();
        assert_eq!(state.feed("   "), Feed::Done);
        assert!(!state.is_continuing());
    }

    #[test]
    fn test_globals_listing() {
        let (mut state, _) = session();
        state.feed("a = 1; b = \"two\";");
        let globals = state.globals();
        assert_eq!(globals, vec!["a = 1".to_string(), "b = two".to_string()]);
    }

    #[test]
    fn test_unknown_command() {
        let (mut state, _) = session();
        assert!(handle_command(":nope", &mut state).is_err());
        assert_eq!(handle_command(":q", &mut state), Ok(true));
    }
}
