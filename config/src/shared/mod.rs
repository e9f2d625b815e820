mod base;
mod batch;
mod connection;
mod indexer;
mod pipeline;
mod retry;
mod sink;
mod state_store;

pub use base::*;
pub use batch::*;
pub use connection::*;
pub use indexer::*;
pub use pipeline::*;
pub use retry::*;
pub use sink::*;
pub use state_store::*;
