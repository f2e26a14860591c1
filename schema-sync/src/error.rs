//! Error kinds produced by the decoder, and the macros used to construct
//! them with a byte-offset/field-name breadcrumb attached.
//!
//! Mirrors the binschema `error.rs`/`do_if_err.rs` split: a flat `Error`
//! enum tagged by `kind`, built through `error!`/`bail!`/`ensure!` so call
//! sites read like assertions instead of manual `Err(...)` construction.

use std::fmt::{self, Display, Formatter};

pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong. See spec §7 for the policy these map to: every kind
/// aborts the current `decode` call; none is recovered internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A read would advance the cursor past the patch's declared length.
    TruncatedInput,
    /// A field index in the patch has no entry in the schema's field table.
    UnknownFieldIndex,
    /// A field table entry names a wire-kind the codec doesn't recognize.
    UnknownWireKind,
    /// A `number` prefix byte fell outside the documented fixint/ext ranges.
    UnknownNumberPrefix,
    /// A `ref`/container-of-schemas field needed a child but the factory
    /// has no constructor for the declared child-schema identity.
    FactoryMiss,
    /// A short-string length prefix implies more bytes than remain.
    ShortStringOverrun,
    /// An array write targeted an index beyond `size` (only `i == size` is
    /// a valid append; `i < size` is a valid overwrite).
    InvalidSetAtIndex,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TruncatedInput => "truncated input",
            ErrorKind::UnknownFieldIndex => "unknown field index",
            ErrorKind::UnknownWireKind => "unknown wire-kind",
            ErrorKind::UnknownNumberPrefix => "unknown number prefix",
            ErrorKind::FactoryMiss => "factory miss",
            ErrorKind::ShortStringOverrun => "short-string overrun",
            ErrorKind::InvalidSetAtIndex => "invalid setAt index",
        }
    }
}

/// A decode failure. Carries the byte offset the cursor was at when the
/// error was raised and, where known, the field currently being decoded.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub offset: usize,
    pub field: Option<&'static str>,
    pub message: String,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind.as_str(), self.offset)?;
        if let Some(field) = self.field {
            write!(f, " (field {:?})", field)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

macro_rules! error {
    ($kind:ident, $offset:expr $(,)?) => {
        $crate::error::Error {
            kind: $crate::error::ErrorKind::$kind,
            offset: $offset,
            field: None,
            message: ::std::string::String::new(),
        }
    };
    ($kind:ident, $offset:expr, $field:expr $(,)?) => {
        $crate::error::Error {
            kind: $crate::error::ErrorKind::$kind,
            offset: $offset,
            field: $field,
            message: ::std::string::String::new(),
        }
    };
    ($kind:ident, $offset:expr, $field:expr, $($msg:tt)+) => {
        $crate::error::Error {
            kind: $crate::error::ErrorKind::$kind,
            offset: $offset,
            field: $field,
            message: ::std::format!($($msg)+),
        }
    };
}

macro_rules! bail {
    ($($t:tt)+) => {
        return ::std::result::Result::Err($crate::error::error!($($t)+))
    };
}

macro_rules! ensure {
    ($cond:expr, $($t:tt)+) => {
        if !($cond) {
            $crate::error::bail!($($t)+);
        }
    };
}

pub(crate) use bail;
pub(crate) use ensure;
pub(crate) use error;
