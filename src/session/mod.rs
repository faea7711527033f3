//! Per-connection session state and outbound plumbing

pub mod context;
pub mod outbound;
pub mod stream;

pub use context::{SessionContext, StreamBinding};
pub use outbound::{DiscardPolicy, OutboundPacket, OutboundReceiver, OutboundSender};
pub use stream::{PublishStreamContext, SubscribeStreamContext};
