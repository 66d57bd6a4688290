/// Operator confirmation for install/update actions.
use std::io::{BufRead, Write};
use tracing::warn;

/// Answers a yes/no question. Implementations decide where the answer comes from.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Asks on stdout and reads one line from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{} [Y/n]: ", prompt);
        if let Err(e) = std::io::stdout().flush() {
            warn!("Failed to flush prompt: {}", e);
        }

        read_answer(&mut std::io::stdin().lock())
    }
}

/// Read one answer line. EOF reads as an empty line, which is yes, so a
/// detached stdin (`/dev/null`) installs the same way Enter does.
pub fn read_answer(reader: &mut impl BufRead) -> bool {
    let mut line = String::new();
    if let Err(e) = reader.read_line(&mut line) {
        warn!("Failed to read answer from stdin: {}", e);
    }
    parse_answer(&line)
}

/// Always agrees. Used for unattended installs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, prompt: &str) -> bool {
        println!("{} [Y/n]: Y", prompt);
        true
    }
}

/// Default-yes: an empty line, `y` or `yes` (any case) agrees.
pub fn parse_answer(line: &str) -> bool {
    let answer = line.trim();
    answer.is_empty() || answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
