//! Wire protocol: JSON-RPC 2.0 frame shapes and the codec that parses and
//! classifies them.

mod codec;
mod frame;
mod version;

pub use codec::{decode_frame, encode_notification, encode_response_error, encode_response_ok};
pub use frame::Frame;
pub use version::ProtocolVersion;
