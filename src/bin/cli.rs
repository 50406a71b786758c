//! Interactive text menu for `ferrolsm`.
//!
//! A numbered loop over get/put/delete/compact/frequency/distinct-values/
//! close, where the first four consume a token and prompt to retry on
//! exhaustion.

use std::io::{self, Write};

use ferrolsm::engine::{Admission, Engine};

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Asks the user whether to retry after the token bucket refused an
/// operation. `Ok(true)` means "try again", `Ok(false)` means "give up".
fn try_again() -> io::Result<bool> {
    println!("-------------------");
    println!("No more tokens.");
    println!("1 Yes");
    println!("2 No");
    Ok(prompt("Try again: ")? == "1")
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt::init();

    let mut engine = match Engine::open(".") {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to open store: {err}");
            return Ok(());
        }
    };

    'menu: loop {
        println!("1 Get");
        println!("2 Put");
        println!("3 Delete");
        println!("4 Compact");
        println!("5 Key frequency");
        println!("6 Distinct values");
        println!("7 Close");
        let option = prompt("Select option: ")?;

        match option.as_str() {
            "1" => loop {
                match engine.get_prompted()? {
                    Admission::Admitted(_) => continue 'menu,
                    Admission::RateLimited => {
                        if !try_again()? {
                            break 'menu;
                        }
                    }
                }
            },
            "2" => loop {
                match engine.put_prompted()? {
                    Admission::Admitted(_) => continue 'menu,
                    Admission::RateLimited => {
                        if !try_again()? {
                            break 'menu;
                        }
                    }
                }
            },
            "3" => loop {
                match engine.delete_prompted()? {
                    Admission::Admitted(_) => continue 'menu,
                    Admission::RateLimited => {
                        if !try_again()? {
                            break 'menu;
                        }
                    }
                }
            },
            "4" => loop {
                match engine.compact() {
                    Ok(Admission::Admitted(())) => continue 'menu,
                    Ok(Admission::RateLimited) => {
                        if !try_again()? {
                            break 'menu;
                        }
                    }
                    Err(err) => {
                        eprintln!("compaction failed: {err}");
                        continue 'menu;
                    }
                }
            },
            "5" => {
                let key = prompt("Enter key: ")?;
                println!("{} frequency: {}", key, engine.key_frequency(&key));
                println!("-------------------");
            }
            "6" => {
                println!("Distinct values: {}", engine.distinct_values());
                println!("-------------------");
            }
            "7" => {
                println!("-------------------");
                break;
            }
            _ => {
                println!("Invalid option!");
                println!("-------------------");
            }
        }
    }

    if let Err(err) = engine.close() {
        eprintln!("failed to persist statistics: {err}");
    }
    Ok(())
}

/// Thin prompting wrappers kept out of the library crate (the driver
/// itself has no notion of stdin/stdout).
trait Prompted {
    fn get_prompted(&mut self) -> io::Result<Admission<()>>;
    fn put_prompted(&mut self) -> io::Result<Admission<()>>;
    fn delete_prompted(&mut self) -> io::Result<Admission<()>>;
}

impl Prompted for Engine {
    fn get_prompted(&mut self) -> io::Result<Admission<()>> {
        let key = prompt("Enter key: ")?;
        println!("-------------------");
        match self.get(&key) {
            Ok(Admission::Admitted(value)) => {
                match value {
                    Some(bytes) => {
                        println!("Key: {key}");
                        println!("Value: {}", String::from_utf8_lossy(&bytes));
                    }
                    None => println!("Key doesn't exist."),
                }
                println!("-------------------");
                Ok(Admission::Admitted(()))
            }
            Ok(Admission::RateLimited) => Ok(Admission::RateLimited),
            Err(err) => {
                eprintln!("get failed: {err}");
                Ok(Admission::Admitted(()))
            }
        }
    }

    fn put_prompted(&mut self) -> io::Result<Admission<()>> {
        let key = prompt("Enter key: ")?;
        let value = prompt("Enter value: ")?;
        println!("-------------------");
        match self.put(&key, value.as_bytes()) {
            Ok(admission) => Ok(admission),
            Err(err) => {
                eprintln!("put failed: {err}");
                Ok(Admission::Admitted(()))
            }
        }
    }

    fn delete_prompted(&mut self) -> io::Result<Admission<()>> {
        let key = prompt("Enter key: ")?;
        println!("-------------------");
        match self.delete(&key) {
            Ok(admission) => Ok(admission),
            Err(err) => {
                eprintln!("delete failed: {err}");
                Ok(Admission::Admitted(()))
            }
        }
    }
}
