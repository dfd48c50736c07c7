//! Pure-Rust raw video conversion.

mod colorspace;

pub use colorspace::{ColorConvert, is_convertible};
