//! Presentation side of the player

pub mod presentation;

pub use presentation::Presentation;
