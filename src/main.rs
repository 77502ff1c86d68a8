use regex_fsm::{Error, MatcherMemory, Regex};

use std::io::{self, Write};
use std::process::ExitCode;

const USAGE: &str = "\
Usage: refsm [--trace] <pattern> [input]...

With no inputs, print the state graph as Graphviz DOT.
With inputs, match each one against the whole pattern.

Options:
  --trace      Print the live nodes after every input byte
  -h, --help   Print this help message";

struct Args {
    trace: bool,
    pattern: String,
    inputs: Vec<String>,
}

/// `None` means: print usage.
fn parse_args(args: impl Iterator<Item = String>) -> Option<Args> {
    let mut trace = false;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--trace" => trace = true,
            "-h" | "--help" => return None,
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    let pattern = positional.next()?;
    Some(Args {
        trace,
        pattern,
        inputs: positional.collect(),
    })
}

/// Point at the offending symbol under the pattern.
fn report_compile_error(pattern: &str, err: &Error) {
    let column = pattern[..err.position()].chars().count();
    eprintln!("error: {err}");
    eprintln!("  {pattern}");
    eprintln!("  {}^", " ".repeat(column));
}

/// Match `input`, returning the verdict and, when every path died early,
/// the offset of the byte that killed the last one.
fn run(
    regex: &Regex,
    memory: &mut MatcherMemory,
    input: &str,
    trace: bool,
) -> (bool, Option<usize>) {
    let mut matcher = memory.matcher(regex);
    for (offset, &b) in input.as_bytes().iter().enumerate() {
        matcher.step(b);
        if trace {
            eprintln!(
                "  {offset:>4} {:?} -> [{}]",
                b as char,
                matcher.cursor_labels().join(", ")
            );
        }
        if matcher.is_rejected() {
            return (false, Some(offset));
        }
    }
    (matcher.finish(), None)
}

fn main() -> ExitCode {
    let Some(args) = parse_args(std::env::args().skip(1)) else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let regex = match Regex::new(&args.pattern) {
        Ok(regex) => regex,
        Err(err) => {
            report_compile_error(&args.pattern, &err);
            return ExitCode::FAILURE;
        }
    };

    if args.inputs.is_empty() {
        let mut out = io::stdout().lock();
        return match regex.to_dot(&mut out).and_then(|()| out.flush()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: failed to write DOT output: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let mut memory = MatcherMemory::default();
    let mut all_matched = true;
    for input in &args.inputs {
        if args.trace {
            eprintln!("{input:?}");
        }
        match run(&regex, &mut memory, input, args.trace) {
            (true, _) => println!("match     {input:?}"),
            (false, Some(offset)) => {
                println!("no match  {input:?} (rejected at byte {offset})");
                all_matched = false;
            }
            (false, None) => {
                println!("no match  {input:?}");
                all_matched = false;
            }
        }
    }

    if all_matched {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
