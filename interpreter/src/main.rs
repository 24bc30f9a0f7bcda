use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::{env, fs, process};

use tlang_core::Error;

use tlang::interpreter::Interpreter;
use tlang::repl;

fn main() {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => {
            println!("Welcome to TLang!");
            let stdout: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(io::stdout()));
            repl::run(io::stdin().lock(), stdout);
        }
        2 => {
            if let Err(errors) = run_file(&args[1]) {
                report_errors(&errors);
                process::exit(1);
            }
        }
        _ => {
            eprintln!("Usage: {} [file]", args[0]);
            process::exit(1);
        }
    }
}

// Host failures (unreadable file, parse errors) flow through the
// shared diagnostic channel; an in-language Err result is already
// rendered and only needs the exit status.
fn run_file(path: &str) -> Result<(), Vec<Error>> {
    let source =
        fs::read_to_string(path).map_err(|err| vec![Error::io(path, err.to_string())])?;

    let stdout: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(io::stdout()));
    let mut interp = Interpreter::new(stdout);
    let outcome = interp.run_source(&source)?;
    if outcome.is_error {
        eprintln!("{}", outcome.rendered);
        process::exit(1);
    }
    Ok(())
}

fn report_errors(errors: &[Error]) {
    if errors.iter().all(|error| matches!(error, Error::Parser { .. })) {
        repl::print_parser_errors(&mut io::stderr(), errors);
    } else {
        for error in errors {
            eprintln!("{}", error);
        }
    }
}
