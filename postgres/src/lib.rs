//! Query layer over the `content` schema of the film catalogue database.

pub mod content;
pub mod db;
