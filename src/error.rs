use thiserror::Error;

/// Errors raised while turning an nmap XML report into host records.
///
/// `UnsupportedVersion` and `Malformed` are stream-level conditions: the parser
/// reports them as diagnostics and stops reading. The remaining variants mean
/// nmap produced a report that breaks its own schema and abort the pipeline.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("element '{element}' not found in <{parent}>")]
    MissingElement {
        element: &'static str,
        parent: String,
    },

    #[error("attribute '{attribute}' not found on <{element}>")]
    MissingAttribute {
        attribute: &'static str,
        element: String,
    },

    #[error("invalid value '{value}' for attribute '{attribute}' on <{element}>")]
    InvalidAttribute {
        attribute: &'static str,
        element: String,
        value: String,
    },

    #[error("unsupported xml schema version '{0}'")]
    UnsupportedVersion(String),

    #[error("xml parser error: {0}")]
    Malformed(String),
}

impl ReportError {
    /// True for conditions that end the stream gracefully instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnsupportedVersion(_) | Self::Malformed(_))
    }
}

impl From<quick_xml::Error> for ReportError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for ReportError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Malformed(err.to_string())
    }
}
