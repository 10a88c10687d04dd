//! Rate-gated submission of documents to a registration API.
//!
//! [`throttle::RateGate`] bounds how many requests leave per time window;
//! [`dispatch::Dispatcher`] puts that gate in front of a [`transport::Transport`]
//! and hands the network leg to a worker pool.

pub mod config;
pub mod dispatch;
pub mod encode;
pub mod error;
pub mod logging;
pub mod recorder;
pub mod rotate;
pub mod throttle;
pub mod transport;
pub mod types;

pub use dispatch::{Dispatcher, PendingResponse};
pub use encode::{Encoder, JsonEncoder};
pub use error::{Error, Result};
pub use throttle::{Admission, GateStats, RateGate};
pub use transport::{Request, Response, Transport, TransportError};
