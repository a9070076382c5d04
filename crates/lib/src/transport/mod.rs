//! Real-time side of the client: the command deck socket and the event bus it feeds.

pub mod backoff;
pub mod bus;
pub mod protocol;
pub mod socket;

pub use backoff::ReconnectPolicy;
pub use bus::{EventBus, Handler, HandlerId, Subscription};
pub use protocol::{AgentStatus, Envelope, ServerEvent, WILDCARD};
pub use socket::{socket_url, ConnectionStatus, Transport, TransportError};
