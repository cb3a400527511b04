//! Tagged worker messages.
//!
//! The first byte selects the message kind:
//!
//! | tag | body |
//! |-----|------|
//! | `x` | final result: `S` + text, `I` + ASCII integer, or `N` |
//! | `O` | stdout line |
//! | `E` | stderr line |
//! | `F` | none (filesystem sync completed) |
//! | `d` | debugger event as JSON |
//! | `i` | input prompt |

use std::fmt;

use thiserror::Error;

use super::debug::DebuggerEvent;
use crate::bridge::Value;

/// Value a script run completes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalResult {
    Str(String),
    Int(i64),
    None,
}

impl From<FinalResult> for Value {
    fn from(result: FinalResult) -> Self {
        match result {
            FinalResult::Str(s) => Value::str(s),
            FinalResult::Int(n) => Value::Int(n),
            FinalResult::None => Value::None,
        }
    }
}

impl fmt::Display for FinalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalResult::Str(s) => write!(f, "{:?}", s),
            FinalResult::Int(n) => write!(f, "{}", n),
            FinalResult::None => write!(f, "None"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    Result(FinalResult),
    Stdout(String),
    Stderr(String),
    FsSynced,
    Debugger(DebuggerEvent),
    Input(String),
}

#[derive(Debug, Error)]
pub enum WorkerProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),
    #[error("unknown result kind {0:?}")]
    UnknownResultKind(Option<u8>),
    #[error("bad integer result '{0}'")]
    BadInteger(String),
    #[error("message body is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("bad debugger event: {0}")]
    BadDebuggerEvent(#[from] serde_json::Error),
    #[error("startup payload is missing the {0}")]
    TruncatedPayload(&'static str),
    #[error("{0} must not contain NUL bytes")]
    EmbeddedNul(&'static str),
    #[error("{0} is not valid UTF-8")]
    NonUtf8Path(&'static str),
}

/// Body text with at most one C string terminator removed.
fn text(body: &[u8]) -> Result<String, WorkerProtocolError> {
    let body = body.strip_suffix(&[0]).unwrap_or(body);
    Ok(std::str::from_utf8(body)?.to_string())
}

impl WorkerMessage {
    pub fn tag(&self) -> u8 {
        match self {
            WorkerMessage::Result(_) => b'x',
            WorkerMessage::Stdout(_) => b'O',
            WorkerMessage::Stderr(_) => b'E',
            WorkerMessage::FsSynced => b'F',
            WorkerMessage::Debugger(_) => b'd',
            WorkerMessage::Input(_) => b'i',
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.tag()];
        match self {
            WorkerMessage::Result(FinalResult::Str(s)) => {
                out.push(b'S');
                out.extend_from_slice(s.as_bytes());
            }
            WorkerMessage::Result(FinalResult::Int(n)) => {
                out.push(b'I');
                out.extend_from_slice(n.to_string().as_bytes());
            }
            WorkerMessage::Result(FinalResult::None) => out.push(b'N'),
            WorkerMessage::Stdout(s) | WorkerMessage::Stderr(s) | WorkerMessage::Input(s) => {
                out.extend_from_slice(s.as_bytes());
            }
            WorkerMessage::FsSynced => {}
            WorkerMessage::Debugger(event) => {
                // A plain struct of strings and integers always serializes
                if let Ok(json) = serde_json::to_vec(event) {
                    out.extend_from_slice(&json);
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WorkerProtocolError> {
        let (&tag, body) = bytes.split_first().ok_or(WorkerProtocolError::Empty)?;
        match tag {
            b'x' => {
                let (kind, rest) = match body.split_first() {
                    Some((&kind, rest)) => (kind, rest),
                    None => return Err(WorkerProtocolError::UnknownResultKind(None)),
                };
                let result = match kind {
                    b'S' => FinalResult::Str(std::str::from_utf8(rest)?.to_string()),
                    b'I' => {
                        let digits = text(rest)?;
                        let n = digits
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| WorkerProtocolError::BadInteger(digits.clone()))?;
                        FinalResult::Int(n)
                    }
                    b'N' => FinalResult::None,
                    other => return Err(WorkerProtocolError::UnknownResultKind(Some(other))),
                };
                Ok(WorkerMessage::Result(result))
            }
            b'O' => Ok(WorkerMessage::Stdout(text(body)?)),
            b'E' => Ok(WorkerMessage::Stderr(text(body)?)),
            b'F' => Ok(WorkerMessage::FsSynced),
            b'd' => {
                let body = body.strip_suffix(&[0]).unwrap_or(body);
                Ok(WorkerMessage::Debugger(serde_json::from_slice(body)?))
            }
            b'i' => Ok(WorkerMessage::Input(text(body)?)),
            other => Err(WorkerProtocolError::UnknownTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_results() {
        assert_eq!(
            WorkerMessage::decode(b"xI42").unwrap(),
            WorkerMessage::Result(FinalResult::Int(42))
        );
        assert_eq!(
            WorkerMessage::decode(b"xI-7\0").unwrap(),
            WorkerMessage::Result(FinalResult::Int(-7))
        );
        assert_eq!(
            WorkerMessage::decode(b"xShello").unwrap(),
            WorkerMessage::Result(FinalResult::Str("hello".to_string()))
        );
        assert_eq!(
            WorkerMessage::decode(b"xN").unwrap(),
            WorkerMessage::Result(FinalResult::None)
        );
        assert_eq!(WorkerMessage::Result(FinalResult::Int(42)).encode(), b"xI42");
    }

    #[test]
    fn test_result_into_value() {
        assert_eq!(Value::from(FinalResult::Int(42)), Value::Int(42));
        assert_eq!(Value::from(FinalResult::Str("s".into())), Value::str("s"));
        assert_eq!(Value::from(FinalResult::None), Value::None);
    }

    #[test]
    fn test_side_channel_messages() {
        assert_eq!(
            WorkerMessage::decode(b"Ohello world").unwrap(),
            WorkerMessage::Stdout("hello world".to_string())
        );
        assert_eq!(
            WorkerMessage::decode(b"Eoops").unwrap(),
            WorkerMessage::Stderr("oops".to_string())
        );
        assert_eq!(WorkerMessage::decode(b"F").unwrap(), WorkerMessage::FsSynced);
        assert_eq!(
            WorkerMessage::decode(b"iName? \0").unwrap(),
            WorkerMessage::Input("Name? ".to_string())
        );
    }

    #[test]
    fn test_debugger_event() {
        let event = DebuggerEvent {
            offset: 3,
            function: "<module>".to_string(),
            file: "main.krk".to_string(),
            line: 1,
            opcode: 7,
        };
        let bytes = WorkerMessage::Debugger(event.clone()).encode();
        assert_eq!(bytes[0], b'd');
        assert_eq!(WorkerMessage::decode(&bytes).unwrap(), WorkerMessage::Debugger(event));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(WorkerMessage::decode(b""), Err(WorkerProtocolError::Empty)));
        assert!(matches!(
            WorkerMessage::decode(b"Zjunk"),
            Err(WorkerProtocolError::UnknownTag(b'Z'))
        ));
        assert!(matches!(
            WorkerMessage::decode(b"x"),
            Err(WorkerProtocolError::UnknownResultKind(None))
        ));
        assert!(matches!(
            WorkerMessage::decode(b"xQ"),
            Err(WorkerProtocolError::UnknownResultKind(Some(b'Q')))
        ));
        assert!(matches!(
            WorkerMessage::decode(b"xIforty"),
            Err(WorkerProtocolError::BadInteger(_))
        ));
        assert!(matches!(
            WorkerMessage::decode(b"d{not json"),
            Err(WorkerProtocolError::BadDebuggerEvent(_))
        ));
        assert!(matches!(
            WorkerMessage::decode(b"O\xff\xfe"),
            Err(WorkerProtocolError::InvalidUtf8(_))
        ));
    }
}
