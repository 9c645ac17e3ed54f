use std::env;
use std::fs;
use std::process::ExitCode;

use matrix::{Config, Matrix, MatrixError, StdIo, report_error};

const USAGE: &str = "\
usage: msl [option]
  (no option)             start the interactive REPL
  --src <file>            run a source file
  --disasm <src> <out>    write the disassembly of a source file
  --compile <src> <out>   compile a source file into a bytecode image
  --exec <image>          run a bytecode image
  -h, -H, --help          show this help";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Repl,
    Help,
    Run(String),
    Disasm(String, String),
    Compile(String, String),
    Exec(String),
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some(first) = args.first() else {
        return Ok(Command::Repl);
    };
    let operand = |i: usize| {
        args.get(i)
            .cloned()
            .ok_or_else(|| format!("missing argument for {}", first))
    };
    let (cmd, used) = match first.as_str() {
        "-h" | "-H" | "--help" => (Command::Help, 1),
        "--src" => (Command::Run(operand(1)?), 2),
        "--disasm" => (Command::Disasm(operand(1)?, operand(2)?), 3),
        "--compile" => (Command::Compile(operand(1)?, operand(2)?), 3),
        "--exec" => (Command::Exec(operand(1)?), 2),
        other => return Err(format!("unknown option: {}", other)),
    };
    if args.len() > used {
        return Err(format!("unexpected argument: {}", args[used]));
    }
    Ok(cmd)
}

fn runtime() -> Matrix {
    Matrix::with_config(Config::from_env(), Box::new(StdIo))
}

/// 오류를 출력용 문자열로. 컴파일 오류는 소스를 다시 읽어 렌더링합니다.
fn describe(e: &MatrixError, src_path: &str) -> String {
    let src = fs::read_to_string(src_path).ok();
    report_error(e, src.as_deref())
}

fn run(cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Repl => {
            matrix::repl::run().map_err(|e| format!("REPL error: {}", e))
        }
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        Command::Run(path) => {
            let mut m = runtime();
            m.exec_file(&path).map_err(|e| describe(&e, &path))?;
            m.close();
            Ok(())
        }
        Command::Disasm(src, out) => {
            let mut m = runtime();
            let id = m.compile_file(&src).map_err(|e| describe(&e, &src))?;
            let mut text = String::new();
            m.disasm(id, |line| {
                text.push_str(line);
                text.push('\n');
            })
            .map_err(|e| e.to_string())?;
            fs::write(&out, text).map_err(|e| format!("{}: {}", out, e))
        }
        Command::Compile(src, out) => {
            let mut m = runtime();
            let id = m.compile_file(&src).map_err(|e| describe(&e, &src))?;
            m.save_image(id, &out).map_err(|e| e.to_string())
        }
        Command::Exec(image) => {
            let mut m = runtime();
            let id = m.load_image(&image).map_err(|e| e.to_string())?;
            m.run_module(id).map_err(|e| e.to_string())?;
            m.close();
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            return ExitCode::FAILURE;
        }
    };

    match run(cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
