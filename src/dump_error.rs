//! Errors raised while compiling format strings
use std::error::Error;
use std::fmt::Display;
use std::io;

/// Type alias for a `Result` with [`DumpError`] as the error type.
pub type DResult<T> = Result<T, DumpError>;

/// An error detected while compiling a format string.
///
/// Every variant is fatal to the compilation run: no partially compiled
/// formats are handed out once one of these is returned. The diagnostic
/// carries the offending fragment, so printing the `Display` form as a
/// single line to stderr before exiting non-zero reproduces the classic
/// tool behavior.
#[derive(Debug)]
pub enum DumpError {
    /// Indicates that a format-spec file could not be opened or read.
    Io(io::Error),

    /// Indicates a malformed format line: a repetition count or byte
    /// count in the wrong place, or an unterminated quoted string.
    /// Carries the whole offending line.
    BadFormat(String),

    /// Indicates an unrecognized conversion character; carries the
    /// fragment starting at that character.
    BadConversion(String),

    /// Indicates an explicit byte width outside the allowed set for the
    /// conversion's class; carries the conversion fragment.
    BadByteCount(String),

    /// Indicates a `%s` conversion with neither a byte count nor a
    /// precision to bound it.
    BadSFormat,

    /// Indicates more than one data-bearing conversion inside a format
    /// unit that carries an explicit byte count.
    MultipleConversions,
}

impl Display for DumpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "can't read format file: {e}"),
            Self::BadFormat(line) => write!(f, "bad format {{{line}}}"),
            Self::BadConversion(frag) => write!(f, "bad conversion character %{frag}"),
            Self::BadByteCount(frag) => {
                write!(f, "bad byte count for conversion character {frag}")
            }
            Self::BadSFormat => write!(f, "%s requires a precision or a byte count"),
            Self::MultipleConversions => {
                write!(f, "byte count with multiple conversion characters")
            }
        }
    }
}

impl Error for DumpError {}

impl From<io::Error> for DumpError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
