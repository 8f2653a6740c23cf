//! Fixed-size metadata table.
//!
//! ```text
//! slot:  name [u8; 8] (ASCII, NUL padded) | value f32 (LE)
//! table: 256 slots × 12 bytes = 3072 bytes, unused slots all zero
//! ```
//!
//! The slot count is part of the wire contract and does not depend on how
//! many readings are configured.

use crate::error::FlycamError;

/// Slots in every legacy packet's metadata table.
pub const METADATA_SLOTS: usize = 256;
/// Bytes reserved for a reading's name.
pub const METADATA_NAME_LEN: usize = 8;
/// Bytes per slot: name + `f32`.
pub const METADATA_ENTRY_SIZE: usize = METADATA_NAME_LEN + 4;
/// Total encoded table size.
pub const METADATA_TABLE_SIZE: usize = METADATA_SLOTS * METADATA_ENTRY_SIZE;

// ── MetadataField ────────────────────────────────────────────────

/// A validated reading name: 1..=8 printable ASCII bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetadataField {
    name: [u8; METADATA_NAME_LEN],
    len: u8,
}

impl MetadataField {
    pub fn new(name: &str) -> Result<Self, FlycamError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > METADATA_NAME_LEN {
            return Err(FlycamError::InvalidConfig(format!(
                "metadata name {name:?} must be 1..={METADATA_NAME_LEN} bytes"
            )));
        }
        if !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(FlycamError::InvalidConfig(format!(
                "metadata name {name:?} must be printable ASCII"
            )));
        }
        let mut padded = [0u8; METADATA_NAME_LEN];
        padded[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            name: padded,
            len: bytes.len() as u8,
        })
    }

    pub fn as_str(&self) -> &str {
        // Validated as ASCII on construction.
        std::str::from_utf8(&self.name[..self.len as usize]).unwrap_or_default()
    }

    /// NUL-padded wire form.
    pub fn wire_name(&self) -> &[u8; METADATA_NAME_LEN] {
        &self.name
    }
}

// ── MetadataTable ────────────────────────────────────────────────

/// Ordered `(name, value)` readings with a pre-rendered wire image.
///
/// Names are written into the encoded table once, at construction; only
/// the value bytes change afterwards.
#[derive(Debug, Clone)]
pub struct MetadataTable {
    fields: Vec<MetadataField>,
    values: Vec<f32>,
    encoded: Box<[u8]>,
}

impl MetadataTable {
    pub fn new(fields: Vec<MetadataField>) -> Result<Self, FlycamError> {
        if fields.len() > METADATA_SLOTS {
            return Err(FlycamError::InvalidConfig(format!(
                "{} metadata fields exceeds {METADATA_SLOTS} slots",
                fields.len()
            )));
        }
        for (i, f) in fields.iter().enumerate() {
            if fields[..i].contains(f) {
                return Err(FlycamError::InvalidConfig(format!(
                    "duplicate metadata field {:?}",
                    f.as_str()
                )));
            }
        }

        let mut encoded = vec![0u8; METADATA_TABLE_SIZE].into_boxed_slice();
        for (slot, field) in fields.iter().enumerate() {
            let at = slot * METADATA_ENTRY_SIZE;
            encoded[at..at + METADATA_NAME_LEN].copy_from_slice(field.wire_name());
        }
        let values = vec![0.0; fields.len()];
        Ok(Self {
            fields,
            values,
            encoded,
        })
    }

    /// Parse names straight from configuration strings.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, FlycamError> {
        let fields = names
            .iter()
            .map(|n| MetadataField::new(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[MetadataField] {
        &self.fields
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Value of the reading called `name`, if configured.
    pub fn get(&self, name: &str) -> Option<f32> {
        self.fields
            .iter()
            .position(|f| f.as_str() == name)
            .map(|i| self.values[i])
    }

    /// Overwrite one slot's value.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= self.len()`.
    pub fn set(&mut self, slot: usize, value: f32) {
        self.values[slot] = value;
        let at = slot * METADATA_ENTRY_SIZE + METADATA_NAME_LEN;
        self.encoded[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrite all values at once; `values` must have one entry per field.
    pub fn set_all(&mut self, values: &[f32]) -> Result<(), FlycamError> {
        if values.len() != self.fields.len() {
            return Err(FlycamError::ShapeMismatch(format!(
                "{} metadata values for {} fields",
                values.len(),
                self.fields.len()
            )));
        }
        for (slot, &v) in values.iter().enumerate() {
            self.set(slot, v);
        }
        Ok(())
    }

    /// The full 256-slot wire image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// Only the configured entries (`len() * 12` bytes), as carried by
    /// split-stream metadata packets.
    pub fn entries_bytes(&self) -> &[u8] {
        &self.encoded[..self.fields.len() * METADATA_ENTRY_SIZE]
    }
}

/// Read `(name, value)` pairs out of an encoded table, skipping empty
/// slots.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<(String, f32)>, FlycamError> {
    if bytes.len() % METADATA_ENTRY_SIZE != 0 {
        return Err(FlycamError::Truncated {
            needed: bytes.len().next_multiple_of(METADATA_ENTRY_SIZE),
            actual: bytes.len(),
        });
    }
    let mut out = Vec::new();
    for entry in bytes.chunks_exact(METADATA_ENTRY_SIZE) {
        let (name, value) = entry.split_at(METADATA_NAME_LEN);
        let end = name.iter().position(|&b| b == 0).unwrap_or(METADATA_NAME_LEN);
        if end == 0 {
            continue;
        }
        let name = String::from_utf8_lossy(&name[..end]).into_owned();
        let value = f32::from_le_bytes([value[0], value[1], value[2], value[3]]);
        out.push((name, value));
    }
    Ok(out)
}

// ── Tests ────────────────────────────────────────────────────────
