use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;

use tlang_core::Error;

use crate::interpreter::Interpreter;

const PROMPT: &str = "T> ";
const CONTINUE: &str = ".. ";

pub fn print_parser_errors(out: &mut dyn Write, errors: &[Error]) {
    let _ = writeln!(out, "PARSER ERRORS:");
    for error in errors {
        let _ = writeln!(out, "    {}", error);
    }
}

/// Read-evaluate-print loop over one shared interpreter, so bindings
/// persist across lines. A trailing `\` continues the line; non-Void
/// results echo through inspect; end of input exits.
pub fn run(input: impl BufRead, output: Rc<RefCell<dyn Write>>) {
    let mut interp = Interpreter::new(Rc::clone(&output));
    let mut lines = input.lines();

    loop {
        {
            let mut out = output.borrow_mut();
            let _ = write!(out, "{}", PROMPT);
            let _ = out.flush();
        }

        let mut line = match lines.next() {
            Some(Ok(line)) => line,
            _ => return,
        };

        while line.ends_with('\\') {
            line.pop();
            {
                let mut out = output.borrow_mut();
                let _ = write!(out, "{}", CONTINUE);
                let _ = out.flush();
            }
            match lines.next() {
                Some(Ok(next)) => line.push_str(&next),
                _ => return,
            }
        }

        match interp.run_source(&line) {
            Ok(outcome) => {
                if !outcome.is_void {
                    let _ = writeln!(output.borrow_mut(), "{}", outcome.rendered);
                }
            }
            Err(errors) => {
                print_parser_errors(&mut *output.borrow_mut(), &errors);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    fn run_session(input: &str) -> String {
        let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        super::run(Cursor::new(input.to_string()), Rc::clone(&output) as _);
        let bytes = output.borrow().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_echoes_non_void_results() {
        let output = run_session("1 + 2;\n");
        assert_eq!(output, "T> 3\nT> ");
    }

    #[test]
    fn test_void_results_stay_silent() {
        let output = run_session("let a = 1;\n");
        assert_eq!(output, "T> T> ");
    }

    #[test]
    fn test_bindings_persist_across_lines() {
        let output = run_session("let a = 40;\na + 2;\n");
        assert_eq!(output, "T> T> 42\nT> ");
    }

    #[test]
    fn test_line_continuation() {
        let output = run_session("1 + \\\n2;\n");
        assert_eq!(output, "T> .. 3\nT> ");
    }

    #[test]
    fn test_parser_errors_are_reported() {
        let output = run_session("let = 5;\n");
        assert!(output.contains("PARSER ERRORS:\n    "), "output: {:?}", output);
    }

    #[test]
    fn test_runtime_errors_echo_via_inspect() {
        let output = run_session("[1][5];\n");
        assert_eq!(output, "T> ERROR: array: out of range\nT> ");
    }
}
