// Registry resolution and push failure classification

mod classify;
mod resolve;

pub use classify::{classify, not_found_error, PushFailure};
pub use resolve::{resolve, ResolvedImage};
