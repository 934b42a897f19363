pub mod config;
pub mod geom;
pub mod viewport;
