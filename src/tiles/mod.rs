pub mod cache;
pub mod layer;
pub mod loader;
pub mod pyramid;
pub mod source;
