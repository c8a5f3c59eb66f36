pub mod access;
pub mod gate;
pub mod git;
mod router;

pub use router::{AppState, create_router};
