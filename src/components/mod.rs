//! Components built on the substrate.

pub mod ticker;
pub mod walk;

pub use ticker::Ticker;
pub use walk::Walk;
