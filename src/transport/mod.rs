//! Framed message transport
//!
//! All inter-process communication uses multipart messages over TCP. A
//! message is an ordered sequence of byte parts that always crosses a relay
//! as the same parts in the same order. On top of the raw sockets sit the
//! request/response transaction primitives and the pub/sub fan-out/fan-in
//! pair used by the forwarding engines.

pub mod endpoint;
pub mod frame;
pub mod pubsub;
pub mod socket;
pub mod transact;

pub use endpoint::Endpoint;
pub use frame::Message;
pub use pubsub::{Publisher, Subscriber};
pub use socket::{MessageListener, MessageSocket};
pub use transact::{Reply, forward, send_failure, send_reply, send_success, transact};
