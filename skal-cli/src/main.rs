use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use skal_core::{CoreError, Session, Value};

/// Run skal scripts or start a REPL.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Script file to run; starts a REPL when omitted
    input: Option<PathBuf>,

    #[arg(
        long,
        value_name = "STAGE",
        help = "Dump an intermediate stage instead of running: ast, ir, chunk"
    )]
    dump: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    match &cli.input {
        Some(path) => run_file(path, cli.dump.as_deref()),
        None => {
            if cli.dump.is_some() {
                eprintln!("--dump is ignored in the REPL");
            }
            repl()
        }
    }
}

fn run_file(path: &PathBuf, dump: Option<&str>) -> Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    let mut session = Session::new();

    match dump {
        None => {
            report(session.eval(&source))?;
        }
        Some("ast") => {
            let stmts = report(session.parse(&source))?;
            for stmt in stmts {
                println!("{stmt:#?}");
            }
        }
        Some("ir") => {
            let descriptors = report(session.compile(&source))?;
            for descriptor in descriptors {
                println!("{descriptor:#?}");
            }
        }
        Some("chunk") => {
            let chunk = report(session.compile_chunk(&source))?;
            print!("{}", chunk.disassemble());
        }
        Some(other) => bail!("unsupported dump stage: {other}"),
    }

    Ok(())
}

/// Surface parse diagnostics individually before failing; other errors
/// pass through with their own message.
fn report<T>(result: std::result::Result<T, CoreError>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(CoreError::Parse(diagnostics)) => {
            for diagnostic in &diagnostics {
                eprintln!("{diagnostic}");
            }
            bail!("aborted with {} parse error(s)", diagnostics.len())
        }
        Err(error) => Err(error.into()),
    }
}

fn repl() -> Result<()> {
    println!("skal repl. Type :quit to exit.");
    println!();

    let mut session = Session::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("skal> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        match line.trim() {
            "" => continue,
            ":quit" => break,
            ":clear" => {
                print!("\x1b[2J\x1b[H");
                io::stdout().flush()?;
            }
            source => match session.eval(source) {
                Ok(Value::Unit) => {}
                Ok(value) => println!("{value}"),
                // report and keep accepting input; the session's
                // bindings are untouched by a failed line
                Err(CoreError::Parse(diagnostics)) => {
                    for diagnostic in diagnostics {
                        eprintln!("{diagnostic}");
                    }
                }
                Err(error) => eprintln!("{error}"),
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn runs_a_script_with_output() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.skal");
        fs::write(
            &input_path,
            "val greeting = \"hello\"; println(greeting + \" world\");",
        )
        .expect("write input");

        Command::cargo_bin("skal-cli")
            .expect("binary exists")
            .arg(&input_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("hello world"));
    }

    #[test]
    fn script_errors_fail_with_context() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.skal");
        fs::write(&input_path, "true + 1;").expect("write input");

        Command::cargo_bin("skal-cli")
            .expect("binary exists")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("illegal operation +"));
    }

    #[test]
    fn parse_errors_are_listed_per_line() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.skal");
        fs::write(&input_path, "val = 1;\nval y = ;").expect("write input");

        Command::cargo_bin("skal-cli")
            .expect("binary exists")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("[line 1]"))
            .stderr(predicate::str::contains("[line 2]"));
    }

    #[test]
    fn dumps_bytecode_listing() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.skal");
        fs::write(&input_path, "val x = 1; x + 2;").expect("write input");

        Command::cargo_bin("skal-cli")
            .expect("binary exists")
            .arg(&input_path)
            .arg("--dump")
            .arg("chunk")
            .assert()
            .success()
            .stdout(predicate::str::contains("StoreGlobal"))
            .stdout(predicate::str::contains("Sum"));
    }

    #[test]
    fn dumps_the_ast() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.skal");
        fs::write(&input_path, "1 + 2;").expect("write input");

        Command::cargo_bin("skal-cli")
            .expect("binary exists")
            .arg(&input_path)
            .arg("--dump")
            .arg("ast")
            .assert()
            .success()
            .stdout(predicate::str::contains("Binary"));
    }

    #[test]
    fn rejects_unknown_dump_stage() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.skal");
        fs::write(&input_path, "1;").expect("write input");

        Command::cargo_bin("skal-cli")
            .expect("binary exists")
            .arg(&input_path)
            .arg("--dump")
            .arg("tokens")
            .assert()
            .failure()
            .stderr(predicate::str::contains("unsupported dump stage"));
    }

    #[test]
    fn repl_evaluates_and_persists_bindings() {
        Command::cargo_bin("skal-cli")
            .expect("binary exists")
            .write_stdin("val x = 40;\nx + 2;\n:quit\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("42"));
    }

    #[test]
    fn repl_reports_errors_and_continues() {
        Command::cargo_bin("skal-cli")
            .expect("binary exists")
            .write_stdin("val x = 1;\ntrue + 1;\nx;\n:quit\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("1"))
            .stderr(predicate::str::contains("illegal operation"));
    }
}
