use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use stepscheme::ast::{Procedure, Value};
use stepscheme::evaluator::{Environment, Status};
use stepscheme::interp::Interpreter;

fn main() {
    env_logger::init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl() {
    println!("stepscheme interactive interpreter");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let mut interp = Interpreter::new();

    loop {
        let prompt = if interp.is_accumulating() {
            "      ...> "
        } else {
            "stepscheme> "
        };

        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim_end();
                if line.is_empty() && !interp.is_accumulating() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Special commands are only recognized between forms
                if !interp.is_accumulating() {
                    match line {
                        ":help" => {
                            print_help();
                            continue;
                        }
                        ":env" => {
                            print_environment(interp.global_env());
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                match interp.feed(line) {
                    Ok(steps) => {
                        for step in steps {
                            match step.status {
                                Status::Done => {
                                    // Don't print None results (e.g. from define)
                                    if !matches!(step.value, Value::None) {
                                        println!("{}", step.value);
                                    }
                                }
                                Status::PendingStep => {
                                    log::trace!("call: {}", step.value);
                                }
                                // Incomplete input; the prompt switches to
                                // continuation mode
                                Status::Parsing => {}
                                Status::PendingPrimitive => {}
                            }
                        }
                    }
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("stepscheme interpreter:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Supported forms:");
    println!("  Numbers: 42, -5, #x1a");
    println!("  Booleans: #t / #f");
    println!("  Quoted atoms: 'foo, '()");
    println!("  Arithmetic: +, -, *, /, mod");
    println!("  Comparison: =, <, >");
    println!("  Lists: list, cons, car, cdr, null?");
    println!("  Binding: define, let, lambda");
    println!("  Control: if, begin, eval, typeof, debug");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (define square (lambda (x) (* x x)))");
    println!("  (square 7)");
    println!("  (let ((x 5)) (+ x 1))");
    println!();
    println!("Multi-line input is accumulated until parentheses balance.");
    println!("Set RUST_LOG=trace to watch procedure-call steps.");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in primitives from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Procedure(Procedure::Primitive(_)) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in operations ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
