//! WFCX dump format.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! magic "WFCX" | version u16 | chunk_size u16 | num_states u16
//! adjacency: S*S*6 bits, bit (a*S + b)*6 + d, LSB-first
//! chunk count u32
//! per chunk: coord 3xi32 | lod u8 | flags u8 | C^3 cells (varint)
//! constraints: byte length u32 | textual constraint blocks (UTF-8)
//! ```
//!
//! Each cell is one varint `v`: an even `v` stores a collapsed state
//! (`v >> 1`); an odd `v` announces a possible-set bitmask of `v >> 1`
//! words, each following as its own varint.

use std::io::{Read, Write};

use strata_common::{
    ChunkCoord, Direction, FormatError, FormatVersion, MagicBytes, StrataError, StrataResult,
};
use strata_wfc::{AdjacencyTable, Cell, StateSet};

use crate::chunk::Chunk;

/// Chunk flag bit: every cell collapsed or budget exhausted.
const FLAG_FULLY_COLLAPSED: u8 = 1 << 0;
/// Chunk flag bit: chunk holds degraded cells.
const FLAG_DEGRADED: u8 = 1 << 1;

/// One persisted chunk.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Lattice position.
    pub coord: ChunkCoord,
    /// LOD index.
    pub lod_level: u8,
    /// Fully-collapsed flag.
    pub fully_collapsed: bool,
    /// Degraded flag.
    pub degraded: bool,
    /// Possible sets in x-fastest cell order.
    pub cells: Vec<StateSet>,
}

impl ChunkRecord {
    /// Captures a record from a live chunk.
    #[must_use]
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            coord: chunk.coord,
            lod_level: chunk.lod_level,
            fully_collapsed: chunk.fully_collapsed,
            degraded: chunk.degraded,
            cells: chunk
                .grid
                .cells()
                .iter()
                .map(|c| c.possible().clone())
                .collect(),
        }
    }

    /// Applies the record's cells and flags onto a freshly created chunk.
    pub fn apply_to(&self, chunk: &mut Chunk) {
        chunk.lod_level = self.lod_level;
        chunk.fully_collapsed = self.fully_collapsed;
        chunk.degraded = self.degraded;
        for (index, possible) in self.cells.iter().enumerate() {
            let boundary = chunk.grid.cell(index).is_boundary;
            let boundary_dir = chunk.grid.cell(index).boundary_dir;
            let mut cell = Cell::from_possible(possible.clone());
            cell.is_boundary = boundary;
            cell.boundary_dir = boundary_dir;
            *chunk.grid.cell_mut(index) = cell;
        }
    }
}

/// Everything a dump holds.
#[derive(Debug)]
pub struct DumpContents {
    /// Cubic chunk side.
    pub chunk_size: u16,
    /// State count.
    pub num_states: u16,
    /// The adjacency table, symmetry-validated on load.
    pub adjacency: AdjacencyTable,
    /// Persisted chunks.
    pub chunks: Vec<ChunkRecord>,
    /// Constraint blocks in the textual format.
    pub constraints_text: String,
}

/// Writes a dump.
pub fn save_dump<W: Write>(
    writer: &mut W,
    chunk_size: u16,
    adjacency: &AdjacencyTable,
    chunks: &[ChunkRecord],
    constraints_text: &str,
) -> StrataResult<()> {
    let num_states = adjacency.num_states();

    writer.write_all(&MagicBytes::DUMP.0)?;
    writer.write_all(&FormatVersion::CURRENT.0.to_le_bytes())?;
    writer.write_all(&chunk_size.to_le_bytes())?;
    writer.write_all(&num_states.to_le_bytes())?;

    let flat = adjacency.to_flat();
    let mut packed = vec![0u8; flat.len().div_ceil(8)];
    for (bit, &allowed) in flat.iter().enumerate() {
        if allowed {
            packed[bit / 8] |= 1 << (bit % 8);
        }
    }
    writer.write_all(&packed)?;

    writer.write_all(&(chunks.len() as u32).to_le_bytes())?;
    for record in chunks {
        writer.write_all(&record.coord.x.to_le_bytes())?;
        writer.write_all(&record.coord.y.to_le_bytes())?;
        writer.write_all(&record.coord.z.to_le_bytes())?;
        writer.write_all(&[record.lod_level])?;
        let mut flags = 0u8;
        if record.fully_collapsed {
            flags |= FLAG_FULLY_COLLAPSED;
        }
        if record.degraded {
            flags |= FLAG_DEGRADED;
        }
        writer.write_all(&[flags])?;
        for possible in &record.cells {
            write_cell(writer, possible)?;
        }
    }

    let text = constraints_text.as_bytes();
    writer.write_all(&(text.len() as u32).to_le_bytes())?;
    writer.write_all(text)?;
    Ok(())
}

/// Reads a dump, validating the magic, version gate, and adjacency
/// symmetry.
pub fn load_dump<R: Read>(reader: &mut R) -> StrataResult<DumpContents> {
    let mut magic = [0u8; 4];
    read_exact(reader, &mut magic, "magic")?;
    if magic != MagicBytes::DUMP.0 {
        return Err(FormatError::BadMagic.into());
    }

    let version = FormatVersion(read_u16(reader, "version")?);
    if !FormatVersion::CURRENT.can_read(version) {
        return Err(FormatError::UnsupportedVersion {
            actual: version.0,
            supported: FormatVersion::CURRENT.0,
        }
        .into());
    }

    let chunk_size = read_u16(reader, "chunk size")?;
    let num_states = read_u16(reader, "state count")?;
    if chunk_size == 0 || num_states == 0 {
        return Err(FormatError::InvalidField(format!(
            "chunk_size={chunk_size}, num_states={num_states}"
        ))
        .into());
    }

    let s = num_states as usize;
    let bit_count = s * s * Direction::COUNT;
    let mut packed = vec![0u8; bit_count.div_ceil(8)];
    read_exact(reader, &mut packed, "adjacency bits")?;
    let flat: Vec<bool> = (0..bit_count)
        .map(|bit| packed[bit / 8] & (1 << (bit % 8)) != 0)
        .collect();
    let adjacency = AdjacencyTable::from_flat(num_states, &flat)
        .map_err(|e| FormatError::InvalidField(format!("adjacency: {e}")))?;

    let chunk_count = read_u32(reader, "chunk count")? as usize;
    let cell_count = (chunk_size as usize).pow(3);
    let mut chunks = Vec::with_capacity(chunk_count);
    for _ in 0..chunk_count {
        let coord = ChunkCoord::new(
            read_i32(reader, "chunk x")?,
            read_i32(reader, "chunk y")?,
            read_i32(reader, "chunk z")?,
        );
        let mut lod_and_flags = [0u8; 2];
        read_exact(reader, &mut lod_and_flags, "chunk header")?;
        let mut cells = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            cells.push(read_cell(reader, num_states)?);
        }
        chunks.push(ChunkRecord {
            coord,
            lod_level: lod_and_flags[0],
            fully_collapsed: lod_and_flags[1] & FLAG_FULLY_COLLAPSED != 0,
            degraded: lod_and_flags[1] & FLAG_DEGRADED != 0,
            cells,
        });
    }

    let text_len = read_u32(reader, "constraint length")? as usize;
    let mut text = vec![0u8; text_len];
    read_exact(reader, &mut text, "constraint text")?;
    let constraints_text = String::from_utf8(text)
        .map_err(|_| FormatError::InvalidField("constraint text is not UTF-8".into()))?;

    Ok(DumpContents {
        chunk_size,
        num_states,
        adjacency,
        chunks,
        constraints_text,
    })
}

fn write_cell<W: Write>(writer: &mut W, possible: &StateSet) -> StrataResult<()> {
    if let Some(state) = possible.sole_state() {
        write_varint(writer, u64::from(state) << 1)?;
    } else {
        let words = possible.words();
        write_varint(writer, ((words.len() as u64) << 1) | 1)?;
        for &word in words {
            write_varint(writer, word)?;
        }
    }
    Ok(())
}

fn read_cell<R: Read>(reader: &mut R, num_states: u16) -> StrataResult<StateSet> {
    let tag = read_varint(reader)?;
    if tag & 1 == 0 {
        let state = tag >> 1;
        if state >= u64::from(num_states) {
            return Err(FormatError::InvalidField(format!("cell state {state}")).into());
        }
        Ok(StateSet::singleton(num_states, state as u16))
    } else {
        let word_count = (tag >> 1) as usize;
        let expected = (num_states as usize).div_ceil(64);
        if word_count != expected {
            return Err(
                FormatError::InvalidField(format!("cell bitmask of {word_count} words")).into(),
            );
        }
        let mut words = Vec::with_capacity(word_count);
        for _ in 0..word_count {
            words.push(read_varint(reader)?);
        }
        Ok(StateSet::from_words(num_states, &words))
    }
}

fn write_varint<W: Write>(writer: &mut W, mut value: u64) -> StrataResult<()> {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            writer.write_all(&[byte])?;
            return Ok(());
        }
        writer.write_all(&[byte | 0x80])?;
    }
}

fn read_varint<R: Read>(reader: &mut R) -> StrataResult<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        read_exact(reader, &mut byte, "varint")?;
        if shift >= 64 {
            return Err(FormatError::InvalidField("varint overflow".into()).into());
        }
        value |= u64::from(byte[0] & 0x7F) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &'static str) -> StrataResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            StrataError::Format(FormatError::Truncated(what))
        } else {
            StrataError::Io(e)
        }
    })
}

fn read_u16<R: Read>(reader: &mut R, what: &'static str) -> StrataResult<u16> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf, what)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R, what: &'static str) -> StrataResult<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, what)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R, what: &'static str) -> StrataResult<i32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf, what)?;
    Ok(i32::from_le_bytes(buf))
}
