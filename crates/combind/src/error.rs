//! Error taxonomy and extended error records
//!
//! Every failure surfaces as [`Error`]. Native failures carry the status code
//! in a [`StatusError`], together with the extended error record a component
//! may have left for the current thread (the in-process counterpart of
//! `SetErrorInfo`/`GetErrorInfo`).

use std::cell::RefCell;
use std::fmt;

use crate::guid::Guid;
use crate::hresult::{self, HRESULT};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed descriptor, reported while synthesizing a binding.
    #[error("configuration error in `{interface}`: {message}")]
    Configuration { interface: String, message: String },

    /// A native call returned a failure status.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// A collection-style accessor rejected its index.
    #[error("index out of range: {0}")]
    Index(String),

    /// Invalid conversion target or argument shape.
    #[error("type error: {0}")]
    Type(String),

    /// No member of that name exists on the bound interface.
    #[error("`{interface}` has no member named `{name}`")]
    Attribute { interface: String, name: String },
}

impl Error {
    pub(crate) fn config(interface: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            interface: interface.into(),
            message: message.into(),
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// The status code, when this is a [`Error::Status`].
    pub fn hresult(&self) -> Option<HRESULT> {
        match self {
            Error::Status(status) => Some(status.hresult),
            _ => None,
        }
    }

    /// Turn a `DISP_E_BADINDEX` status into [`Error::Index`]; everything else
    /// is returned unchanged.
    pub(crate) fn into_index_error(self) -> Self {
        match self {
            Error::Status(status) if status.hresult == hresult::DISP_E_BADINDEX => {
                Error::Index("invalid index".into())
            }
            other => other,
        }
    }
}

/// A failed native call.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusError {
    pub hresult: HRESULT,
    pub text: String,
    pub record: Option<ErrorRecord>,
    /// Index of the offending argument reported by `IDispatch::Invoke`.
    pub arg_error: Option<u32>,
}

impl StatusError {
    pub fn new(hresult: HRESULT) -> Self {
        Self {
            hresult,
            text: hresult::message(hresult),
            record: None,
            arg_error: None,
        }
    }

    /// Attach an extended error record; its description replaces the text.
    pub fn with_record(mut self, record: ErrorRecord) -> Self {
        if let Some(description) = &record.description {
            self.text = description.clone();
        }
        self.record = Some(record);
        self
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}: {}", self.hresult as u32, self.text)?;
        if let Some(source) = self.record.as_ref().and_then(|r| r.source.as_ref()) {
            write!(f, " (source: {source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for StatusError {}

/// Extended error information attached to a failed call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Interface that raised the error.
    pub iid: Guid,
    pub description: Option<String>,
    pub source: Option<String>,
    pub help_file: Option<String>,
    pub help_context: u32,
}

thread_local! {
    static CURRENT_RECORD: RefCell<Option<ErrorRecord>> = const { RefCell::new(None) };
}

/// Leave an error record for the current thread. Components call this right
/// before returning a failure status.
pub fn set_error_record(record: ErrorRecord) {
    CURRENT_RECORD.with(|slot| *slot.borrow_mut() = Some(record));
}

/// Take the current thread's error record, clearing it.
pub fn take_error_record() -> Option<ErrorRecord> {
    CURRENT_RECORD.with(|slot| slot.borrow_mut().take())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_index_translation() {
        let err = Error::from(StatusError::new(hresult::DISP_E_BADINDEX)).into_index_error();
        assert!(matches!(err, Error::Index(_)));

        let err = Error::from(StatusError::new(hresult::E_FAIL)).into_index_error();
        assert_eq!(err.hresult(), Some(hresult::E_FAIL));
    }

    #[test]
    fn test_record_replaces_text() {
        let status = StatusError::new(hresult::E_FAIL).with_record(ErrorRecord {
            description: Some("disk on fire".into()),
            source: Some("Widget".into()),
            ..Default::default()
        });
        assert_eq!(status.text, "disk on fire");
        assert_eq!(status.to_string(), "0x80004005: disk on fire (source: Widget)");
    }

    #[test]
    fn test_thread_record_is_taken_once() {
        set_error_record(ErrorRecord {
            description: Some("once".into()),
            ..Default::default()
        });
        assert!(take_error_record().is_some());
        assert!(take_error_record().is_none());
    }
}
