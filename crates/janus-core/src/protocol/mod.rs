//! Protocol module: wire types, the JSON codec and transaction identifiers.

pub mod codec;
pub mod messages;
pub mod transaction;

pub use codec::{
    decode_frame, encode_request, EventKind, FrameError, GatewayEvent, GatewayRejection,
    InboundFrame, Reply, ReplyPayload,
};
pub use messages::*;
pub use transaction::{TransactionId, TransactionIdAllocator};
