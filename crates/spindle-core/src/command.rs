use crate::controller::Direction;

/// A complete token recognised by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SimpleChar(char),
    SetTargetRpm(u32),
}

/// Operator intent carried by a single-character command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    SetDirection(Direction),
    Faster,
    Slower,
    SwitchToAutomatic,
    SwitchToManual,
    IncrementTarget,
    DecrementTarget,
}

impl ControlCommand {
    pub fn from_char(c: char) -> Option<Self> {
        let cmd = match c {
            's' => ControlCommand::Start,
            'x' => ControlCommand::Stop,
            'c' => ControlCommand::SetDirection(Direction::Forward),
            'v' => ControlCommand::SetDirection(Direction::Reverse),
            'f' => ControlCommand::Faster,
            'd' => ControlCommand::Slower,
            'a' => ControlCommand::SwitchToAutomatic,
            'm' => ControlCommand::SwitchToManual,
            '+' => ControlCommand::IncrementTarget,
            '-' => ControlCommand::DecrementTarget,
            _ => return None,
        };
        Some(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_wire_character() {
        let table = [
            ('s', ControlCommand::Start),
            ('x', ControlCommand::Stop),
            ('c', ControlCommand::SetDirection(Direction::Forward)),
            ('v', ControlCommand::SetDirection(Direction::Reverse)),
            ('f', ControlCommand::Faster),
            ('d', ControlCommand::Slower),
            ('a', ControlCommand::SwitchToAutomatic),
            ('m', ControlCommand::SwitchToManual),
            ('+', ControlCommand::IncrementTarget),
            ('-', ControlCommand::DecrementTarget),
        ];
        for (c, expected) in table {
            assert_eq!(ControlCommand::from_char(c), Some(expected), "char {c:?}");
        }
    }

    #[test]
    fn unknown_characters_map_to_nothing() {
        for c in ['\n', '\r', ' ', 'r', 'S', '9', ':'] {
            assert_eq!(ControlCommand::from_char(c), None);
        }
    }
}
