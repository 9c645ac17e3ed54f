use std::cell::RefCell;
use std::rc::Rc;

/// Abstraction over runtime output so the VM can remain pure w.r.t. environment.
pub trait RuntimeIo {
    fn write_line(&mut self, s: &str);
    fn write(&mut self, s: &str);
    fn flush(&mut self) {}
}

/// Default I/O that talks to process stdout (CLI use).
pub struct StdIo;

impl RuntimeIo for StdIo {
    fn write_line(&mut self, s: &str) {
        println!("{}", s);
    }
    fn write(&mut self, s: &str) {
        print!("{}", s);
    }
    fn flush(&mut self) {
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }
}

/// Buffer-based I/O for tests and embedding: output accumulates in memory.
///
/// Clones share the same buffer, so a caller can keep one clone and hand the other to the
/// runtime.
#[derive(Clone, Default)]
pub struct BufferIo {
    output: Rc<RefCell<String>>,
}

impl BufferIo {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get_output(&self) -> String {
        self.output.borrow().clone()
    }
    pub fn drain_output(&self) -> String {
        std::mem::take(&mut *self.output.borrow_mut())
    }
    pub fn clear_output(&self) {
        self.output.borrow_mut().clear();
    }
}

impl RuntimeIo for BufferIo {
    fn write_line(&mut self, s: &str) {
        let mut out = self.output.borrow_mut();
        out.push_str(s);
        out.push('\n');
    }
    fn write(&mut self, s: &str) {
        self.output.borrow_mut().push_str(s);
    }
}
