//! Timed HTTP exchanges: a hand-written HTTP/1.1 codec, HTTP/2 via `h2`, and
//! the phase timer hooked into both.
pub mod executor;
pub mod request;
pub mod response;
pub mod timing;
pub mod transport;

pub use executor::RequestExecutor;
pub use timing::{millis, PhaseTimer, TimingRecord};
pub use transport::{Transport, TransportSettings};
