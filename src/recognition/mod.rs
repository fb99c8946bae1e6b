//! Visual recognition primitives.
//!
//! - Template matching by normalized cross-correlation
//! - Two-digit price recognition built on the digit templates
//! - Single-pixel color probes

pub mod color;
pub mod digits;
pub mod template;

pub use color::ColorProbe;
pub use digits::PriceRecognizer;
pub use template::{match_template, DigitTemplates};
