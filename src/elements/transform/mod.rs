//! Raw video transforms.
//!
//! - [`VideoConvertElement`]: convert between pixel formats (RGBA -> RGB, I420 -> BGR, etc.)

mod videoconvert;

pub use videoconvert::VideoConvertElement;
