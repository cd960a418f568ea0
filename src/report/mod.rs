pub mod element;
pub mod parser;

pub use element::Element;
pub use parser::{ParseSummary, parse_report};

/// Report schema versions this crate understands.
pub const SUPPORTED_VERSION_PREFIX: &str = "1.";
