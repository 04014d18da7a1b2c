//! Text exposition format support.
//!
//! - `model`: metric families and samples
//! - `parser`: response body to families, with skip-and-continue on bad lines
//! - `writer`: families back to text, escaping symmetrically with the parser

pub mod model;
pub mod parser;
pub mod writer;

pub use model::{MetricFamily, MetricKind, Sample};
pub use parser::{
    is_valid_label_name, is_valid_metric_name, parse, parse_bytes, ExpositionError,
    ParsedExposition,
};
pub use writer::{encode, write_families, write_family};
