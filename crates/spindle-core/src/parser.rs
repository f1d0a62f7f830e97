//! Incremental command parser.
//!
//! Bytes may arrive in arbitrary fragments; parser state carries over between
//! calls so `r:1500` split across several reads still yields one command.

use crate::command::Command;

pub const TARGET_PREFIX: u8 = b'r';
pub const TARGET_SEPARATOR: u8 = b':';
pub const MAX_DIGITS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Normal,
    AwaitSeparator,
    ReadDigits,
}

#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    state: ParserState,
    digits: [u8; MAX_DIGITS],
    len: usize,
}

fn is_line_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ParserState::Normal;
        self.len = 0;
    }

    /// Consumes one byte. A terminated target token can emit two commands.
    pub fn push(&mut self, byte: u8) -> [Option<Command>; 2] {
        match self.state {
            ParserState::Normal => {
                if byte == TARGET_PREFIX {
                    self.state = ParserState::AwaitSeparator;
                    [None, None]
                } else {
                    [Some(simple(byte)), None]
                }
            }
            ParserState::AwaitSeparator => {
                if byte == TARGET_SEPARATOR {
                    self.state = ParserState::ReadDigits;
                    self.len = 0;
                    [None, None]
                } else {
                    // The pending 'r' is dropped as a false start.
                    self.state = ParserState::Normal;
                    [Some(simple(byte)), None]
                }
            }
            ParserState::ReadDigits => {
                if byte.is_ascii_digit() {
                    if self.len < MAX_DIGITS {
                        self.digits[self.len] = byte;
                        self.len += 1;
                    }
                    return [None, None];
                }
                let target = self.take_number().map(Command::SetTargetRpm);
                self.state = ParserState::Normal;
                let trailing = (!is_line_terminator(byte)).then(|| simple(byte));
                match target {
                    Some(t) => [Some(t), trailing],
                    None => [trailing, None],
                }
            }
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Command> {
        bytes
            .iter()
            .flat_map(|&b| self.push(b))
            .flatten()
            .collect()
    }

    fn take_number(&mut self) -> Option<u32> {
        if self.len == 0 {
            return None;
        }
        // 15 digits always fit in u64.
        let value = self.digits[..self.len]
            .iter()
            .fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0'));
        self.len = 0;
        Some(u32::try_from(value).unwrap_or(u32::MAX))
    }
}

fn simple(byte: u8) -> Command {
    Command::SimpleChar(char::from(byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_characters_pass_straight_through() {
        let mut p = CommandParser::new();
        assert_eq!(
            p.feed(b"sfx"),
            vec![
                Command::SimpleChar('s'),
                Command::SimpleChar('f'),
                Command::SimpleChar('x')
            ]
        );
    }

    #[test]
    fn target_split_over_five_reads() {
        let mut p = CommandParser::new();
        let mut out = Vec::new();
        for chunk in [&b"r"[..], b":", b"15", b"00", b"x"] {
            out.extend(p.feed(chunk));
        }
        assert_eq!(
            out,
            vec![Command::SetTargetRpm(1500), Command::SimpleChar('x')]
        );
        assert_eq!(p.state(), ParserState::Normal);
    }

    #[test]
    fn newline_terminates_without_extra_command() {
        let mut p = CommandParser::new();
        assert_eq!(p.feed(b"r:750\n"), vec![Command::SetTargetRpm(750)]);
        assert_eq!(p.feed(b"r:20\r\n"), vec![
            Command::SetTargetRpm(20),
            Command::SimpleChar('\n')
        ]);
    }

    #[test]
    fn false_start_drops_the_r() {
        let mut p = CommandParser::new();
        assert_eq!(p.feed(b"rf"), vec![Command::SimpleChar('f')]);
        assert_eq!(p.state(), ParserState::Normal);
    }

    #[test]
    fn non_digit_after_separator_becomes_simple_command() {
        let mut p = CommandParser::new();
        assert_eq!(p.feed(b"r:x"), vec![Command::SimpleChar('x')]);
        assert_eq!(p.feed(b"r:\n"), vec![]);
    }

    #[test]
    fn excess_digits_are_dropped() {
        let mut p = CommandParser::new();
        let cmds = p.feed(b"r:12345678901234567890\n");
        assert_eq!(cmds, vec![Command::SetTargetRpm(u32::MAX)]);

        let cmds = p.feed(b"r:000000000001234999\n");
        // Only the first 15 digits count.
        assert_eq!(cmds, vec![Command::SetTargetRpm(1234)]);
    }

    #[test]
    fn reset_discards_partial_token() {
        let mut p = CommandParser::new();
        assert!(p.feed(b"r:12").is_empty());
        p.reset();
        assert_eq!(p.feed(b"3\n"), vec![
            Command::SimpleChar('3'),
            Command::SimpleChar('\n')
        ]);
    }
}
