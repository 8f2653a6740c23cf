//! Adaptive bit-depth frame codec.
//!
//! ```text
//! Frame ──quantize──► QuantizedFrame ──pack──► packed bytes ──[compress]──►
//!   └────────────── quantize_and_pack (fused) ──────────────┘
//! ```
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `widths`   | Validated per-channel bit-width vector             |
//! | `quantize` | Truncating 8 → n bit reduction and its expansion    |
//! | `pack`     | MSB-first variable-width bit packing / unpacking   |
//! | `fused`    | Single-pass quantize + pack                        |
//! | `compress` | Optional reversible block compression              |

pub mod compress;
pub mod fused;
pub mod pack;
pub mod quantize;
pub mod widths;

pub use compress::{CompressionKind, Compressor, Lz4Compressor, ZstdCompressor};
pub use fused::{quantize_and_pack, quantize_and_pack_into};
pub use pack::{pack, pack_into, unpack};
pub use quantize::{expand, quantize};
pub use widths::BitWidths;
