pub mod events;
pub mod gestures;
