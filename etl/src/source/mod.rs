//! Read access to the film catalogue.

mod base;
pub mod memory;
pub mod postgres;

pub use base::{ChangeOrigin, Source};
