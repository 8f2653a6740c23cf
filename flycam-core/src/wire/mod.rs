//! Packet framing.
//!
//! | Module     | Purpose                                                  |
//! |------------|----------------------------------------------------------|
//! | `metadata` | Fixed 256-slot `(name, f32)` table                        |
//! | `legacy`   | Fixed header + bitstream payload + metadata table         |
//! | `split`    | Separate video (encoded image) and metadata packets       |
//!
//! Framers own a buffer sized once at startup; steady-state framing never
//! allocates.

pub mod legacy;
pub mod metadata;
pub mod split;

pub use legacy::{FramerState, LegacyFramer, LegacyPacket};
pub use metadata::{
    METADATA_ENTRY_SIZE, METADATA_SLOTS, METADATA_TABLE_SIZE, MetadataField, MetadataTable,
    read_entries,
};
pub use split::{MetadataFramer, VideoFramer};
