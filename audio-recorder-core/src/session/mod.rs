pub mod handle;
pub mod recorder;
pub mod render;
mod shared;
