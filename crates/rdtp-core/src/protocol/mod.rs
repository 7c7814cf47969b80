//! Protocol module containing the packet type, the binary codec, and the
//! packet builder.

pub mod builder;
pub mod codec;
pub mod packet;

pub use builder::{connect_packet, disconnect_packet, fragment_data, fragment_revive};
pub use codec::{decode_packet, encode_packet, ProtocolError};
pub use packet::*;
