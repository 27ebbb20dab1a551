pub mod sight;

pub use sight::{ReferencePoint, Sight};
