pub mod locator;
pub mod marker;
pub mod types;

pub use locator::ElementLocator;
pub use types::{Element, ElementKind, Observation, Rect};
