//! Pure-text parsing for the citation pipeline: locating the bibliography
//! section of a document, splitting it into individual reference blocks, and
//! extracting DOI tokens. No I/O happens here; everything is a total function
//! over strings.

pub mod identifiers;
pub mod section;

pub use identifiers::{extract_dois, get_query_words};
pub use section::{locate_references, segment_references};
