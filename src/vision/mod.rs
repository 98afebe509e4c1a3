//! Frame sampling, text recognition and icon matching over recordings.

pub mod frames;
pub mod ocr;
pub mod template;

pub use frames::{FrameSampler, SampleWindow};
pub use ocr::{Detections, PaddleOcr, TextRecognizer};
pub use template::{detect_icons, load_templates, IconMatch, IconTemplate};
