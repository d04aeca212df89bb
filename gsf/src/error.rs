use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GsfError {
    #[error("unsupported signature, file does not begin with \"SSBB\"")]
    UnsupportedSignature,
    #[error("wrong file type {}, expected \"grsg\"", render_tag(.0))]
    WrongFileType([u8; 4]),
    #[error("unsupported major version {0}")]
    UnsupportedMajorVersion(u16),
    #[error("unexpected end of stream")]
    TruncatedInput,
    #[error("malformed block: {0}")]
    MalformedBlock(String),
    #[error("duplicate segment local id {0}")]
    DuplicateLocalId(u16),
    #[error("grain references undeclared local id {0}")]
    UnknownLocalId(u16),
    #[error("grain payload truncated, expected {expected} bytes but grdt carries {actual}")]
    TruncatedPayload { expected: u64, actual: u64 },
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),
    #[error("encoder is {actual}, operation requires {required}")]
    EncoderState {
        required: &'static str,
        actual: &'static str,
    },
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for GsfError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => GsfError::TruncatedInput,
            _ => GsfError::Io(e),
        }
    }
}

fn render_tag(tag: &[u8; 4]) -> String {
    match std::str::from_utf8(tag) {
        Ok(s) => format!("{:?}", s),
        Err(_) => format!("{:02x?}", tag),
    }
}
