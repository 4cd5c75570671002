//! Flowport - flow-based programming component substrate
//!
//! Ports, connection barrier, shutdown coordination and cancellation for
//! components that exchange information packets over message transports.
//!
//! ## Architecture
//! ```text
//!             ┌──────────────────── Component ────────────────────┐
//!             │                                                   │
//! upstream ──▶│ Port(in) ──┐                      ┌──▶ Port(out) │──▶ downstream
//!             │            │    component loop    │               │
//!             │            └──▶ recv / poll ──────┘               │
//!             │                                                   │
//!             │ connection events ──▶ EventFanIn ──▶ barrier       │
//!             │                                 └──▶ shutdown ──┐ │
//!             │ OS signals ───────────────────────────────────▶ Cancellation
//!             └───────────────────────────────────────────────────┘
//! ```

pub mod barrier;
pub mod cancel;
pub mod cli;
pub mod component;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod packet;
pub mod port;
pub mod shutdown;
pub mod transport;
pub mod utils;

pub use cancel::{CancelReason, Cancellation};
pub use component::{Component, ComponentLoop, ComponentSpec, Endpoints, PortSpec};
pub use error::ComponentError;
pub use packet::{is_data_packet, is_valid_packet, Packet};
pub use port::{Port, PortError, PortRole};
