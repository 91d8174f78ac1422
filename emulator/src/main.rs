mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use session::{PenFault, Session};

fn main() -> io::Result<()> {
    let fault = parse_fault().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: emulator [--pen <nominal|shorted|broken|no-sensor>]");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(fault);
    let mut line = String::new();

    writeln!(
        writer,
        "Station emulator ready ({fault:?} pen). Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed);
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_fault() -> Result<PenFault, String> {
    let mut args = env::args().skip(1);
    if let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--pen=") {
            PenFault::from_tag(value)
        } else if arg == "--pen" {
            if let Some(value) = args.next() {
                PenFault::from_tag(&value)
            } else {
                Err("Expected value after --pen".to_string())
            }
        } else {
            PenFault::from_tag(&arg)
        }
    } else {
        Ok(PenFault::Nominal)
    }
}
