use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while classifying an osmChange document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClassifyError {
    /// The diff file could not be opened.
    #[error("failed to open diff {path:?}: {source}")]
    Open { source: io::Error, path: PathBuf },
    /// The document is not well-formed XML.
    #[error("malformed osmChange document at byte {position}: {source}")]
    Xml {
        position: u64,
        source: quick_xml::Error,
    },
    /// The document ended inside an open element.
    #[error("osmChange document ended before <{element}> was closed")]
    Truncated { element: String },
}
