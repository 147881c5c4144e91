mod ast;
mod codegen;
mod jit;
mod lexer;
mod parser;
mod session;

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use inkwell::context::Context;

use crate::session::Session;

/// JIT repl for a tiny expression language: every top-level construct is
/// compiled and executed as it is read.
#[derive(Parser, Debug)]
#[command(name = "kaleido", version, about)]
struct Args {
    /// Source file to evaluate; reads from stdin when omitted.
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Print the IR of every compiled unit to stderr.
    #[arg(long)]
    dump_ir: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let source = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let context = Context::create();
    let mut session = Session::new(&context, args.dump_ir)?;
    session.run(&source, &mut io::stdout())?;

    Ok(())
}
