//! Error types for filling and flattening entry containers.
//!
//! Every failure is fatal for the current run. The only non-fatal condition in
//! the crate is a filter name that does not exist in the input, which is
//! reported through [`crate::validation`] instead of this type.

use thiserror::Error;

/// Boxed source error carried by [`FillError::Io`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FillError>;

/// Errors that can occur while discovering, filling, or projecting records.
#[derive(Debug, Error)]
pub enum FillError {
    /// Mutually exclusive options were combined, or an option value is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A resource could not be opened, read, or written.
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: BoxError,
    },

    /// A named field or group is absent where it is required.
    #[error("lookup error: {what} '{name}' is missing")]
    Lookup { what: &'static str, name: String },

    /// A storage kind the value bridge or coercion path cannot handle.
    #[error("type error: unsupported field type {type_name} for field '{field}'")]
    Type { field: String, type_name: String },
}

impl FillError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub(crate) fn missing_field(name: impl Into<String>) -> Self {
        Self::Lookup {
            what: "field",
            name: name.into(),
        }
    }

    pub(crate) fn missing_group(name: impl Into<String>) -> Self {
        Self::Lookup {
            what: "group",
            name: name.into(),
        }
    }

    pub(crate) fn unsupported_type(field: impl Into<String>, type_name: impl ToString) -> Self {
        Self::Type {
            field: field.into(),
            type_name: type_name.to_string(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Io {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn invalid_data(context: impl Into<String>) -> Self {
        Self::io(context, std::io::Error::from(std::io::ErrorKind::InvalidData))
    }
}

/// Attach an I/O context string to a fallible operation, in the spirit of
/// `anyhow::Context::with_context`.
pub(crate) trait IoContext<T> {
    fn with_io_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> IoContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_io_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| FillError::io(f(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_message_names_the_field() {
        let err = FillError::missing_field("evt_id");
        assert_eq!(err.to_string(), "lookup error: field 'evt_id' is missing");
    }

    #[test]
    fn io_context_wraps_source() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.with_io_context(|| "open data.parquet").unwrap_err();
        assert!(matches!(err, FillError::Io { .. }));
        assert_eq!(err.to_string(), "I/O error: open data.parquet: gone");
    }
}
