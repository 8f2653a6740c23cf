//! Latest-wins packet delivery over UDP.
//!
//! | Module     | Purpose                                               |
//! |------------|-------------------------------------------------------|
//! | `chunk`    | MTU-sized datagram framing and newest-only reassembly  |
//! | `sender`   | `PushSocket` trait, UDP `LatestSender`, `MemorySocket` |
//! | `receiver` | Async `PacketReceiver` for tools and tests            |

pub mod chunk;
pub mod receiver;
pub mod sender;

pub use chunk::{ChunkHeader, PacketAssembler, RESTART_WINDOW, chunk_count, split_packet};
pub use receiver::PacketReceiver;
pub use sender::{
    DEFAULT_MTU, LatestSender, MemorySocket, PushSocket, TransportSnapshot, TransportStats,
};
