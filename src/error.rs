use std::io;

use base64;
use failure::Fail;

use tlv::Tag;

/// Fatal problems while rebuilding an archive blob. Any of these abandons the
/// blob; whatever was already written below the output root stays there.
#[derive(Debug, Fail)]
pub enum ArchiveError {
    #[fail(display = "truncated {} field: expected {} bytes, found {}", field, expected, actual)]
    Framing {
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    #[fail(display = "unrecognized archive header: {}", _0)]
    Format(String),

    #[fail(display = "unexpected {} {}", found, state)]
    Structure {
        found: String,
        state: &'static str,
    },

    #[fail(display = "entry name is not ASCII: {:?}", _0)]
    Decode(String),

    #[fail(display = "unsupported file type {:#o} for {}", kind, path)]
    UnsupportedType { kind: u32, path: String },

    #[fail(display = "refusing to write {} outside of {}", target, root)]
    PathEscape { target: String, root: String },

    #[fail(display = "I/O error")]
    Io(#[cause] io::Error),
}

impl ArchiveError {
    pub(crate) fn unexpected(tag: Tag, state: &'static str) -> Self {
        ArchiveError::Structure { found: format!("{} record", tag), state }
    }

    pub(crate) fn premature_end(state: &'static str) -> Self {
        ArchiveError::Structure { found: "end of archive".to_owned(), state }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(e: io::Error) -> Self {
        ArchiveError::Io(e)
    }
}

/// Problems turning one base64 section into its name and payload.
#[derive(Debug, Fail)]
pub enum SectionError {
    #[fail(display = "invalid base64")]
    Base64(#[cause] base64::DecodeError),

    #[fail(display = "section has no name terminator")]
    MissingName,

    #[fail(display = "section name is not ASCII: {:?}", _0)]
    BadName(String),

    #[fail(display = "failed to inflate section payload")]
    Inflate(#[cause] io::Error),
}

impl From<base64::DecodeError> for SectionError {
    fn from(e: base64::DecodeError) -> Self {
        SectionError::Base64(e)
    }
}
