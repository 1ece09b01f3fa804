pub mod device;
pub mod error;
pub mod options;

pub use device::{FileImage, ImageDevice, ImageInfo, MemoryImage};
pub use error::{E2Error, E2Result};
pub use options::{InodeSize, InspectOptions};
