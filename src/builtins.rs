use crate::vm::builtins::{convert, print, system};
use crate::vm::value::NativeFn;

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub func: NativeFn,
}

impl Builtin {
    pub const fn arity(&self) -> usize {
        self.params.len()
    }
}

const INFO: Builtin = Builtin {
    name: "info",
    params: &[],
    func: print::info,
};
const PRINT: Builtin = Builtin {
    name: "print",
    params: &["value"],
    func: print::print,
};
const PRINTLN: Builtin = Builtin {
    name: "println",
    params: &["value"],
    func: print::println,
};
const TICK: Builtin = Builtin {
    name: "tick",
    params: &[],
    func: system::tick,
};
const SLEEP: Builtin = Builtin {
    name: "sleep",
    params: &["ms"],
    func: system::sleep,
};
const ABS: Builtin = Builtin {
    name: "abs",
    params: &["n"],
    func: convert::abs,
};
const INT: Builtin = Builtin {
    name: "int",
    params: &["x"],
    func: convert::int,
};
const FLOAT: Builtin = Builtin {
    name: "float",
    params: &["x"],
    func: convert::float,
};
const STR: Builtin = Builtin {
    name: "str",
    params: &["x"],
    func: convert::str,
};
const ENV: Builtin = Builtin {
    name: "env",
    params: &["name"],
    func: system::env,
};
const LEN: Builtin = Builtin {
    name: "len",
    params: &["x"],
    func: convert::len,
};

static REGISTRY: &[Builtin] = &[
    INFO, PRINT, PRINTLN, TICK, SLEEP, ABS, INT, FLOAT, STR, ENV, LEN,
];

pub fn all() -> &'static [Builtin] {
    REGISTRY
}

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    REGISTRY.iter().find(|&b| b.name == name).map(|v| v as _)
}
