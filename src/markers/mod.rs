pub mod controller;
pub mod poi;
pub mod service;
pub mod visited;
