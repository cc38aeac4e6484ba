use std::fmt;

use crate::ProtocolError;

/// One-byte command code sent by the client at the start of each exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    List = 1,
    Get = 2,
    Put = 3,
    Bye = 4,
}

impl Command {
    /// Wire value of the command.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Command::List),
            2 => Ok(Command::Get),
            3 => Ok(Command::Put),
            4 => Ok(Command::Bye),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::List => write!(f, "LIST"),
            Command::Get => write!(f, "GET"),
            Command::Put => write!(f, "PUT"),
            Command::Bye => write!(f, "BYE"),
        }
    }
}
