pub mod bus;
pub mod envelope;
pub mod nats;

pub use bus::{ConsumeStyle, Consumer, MessageBus};
pub use envelope::{Acker, MessageEnvelope};
pub use nats::{NatsBus, NatsBusConfig};
