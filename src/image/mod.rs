//! Image references and filtering

pub mod filter;
pub mod reference;

pub use filter::{FilterCriteria, FilterMarkers, ImageCategory, ImageFilter};
pub use reference::ImageReference;
