//! Core types shared by adapters, streamers, and the HTTP surface.

pub mod generation;
pub mod info;
pub mod message;
pub mod stream;
pub mod usage;

pub use generation::*;
pub use info::*;
pub use message::*;
pub use stream::*;
pub use usage::*;
