pub mod aperture;
pub mod background;
pub mod calibration;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod fits;
pub mod mask;
pub mod sigma_clip;
pub mod stretch;

// Re-export commonly used items
pub use background::{estimate_background, BackgroundEstimate, BackgroundParams};
pub use fits::{FitsImage, ImageStatistics};
pub use mask::Mask;
