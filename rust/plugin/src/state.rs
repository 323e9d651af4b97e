//! Versioned little-endian state persistence.
//!
//! Layout: save version (`u32`), engine version (`u32` × 3), synth
//! type tag (`u8`), parameter record count (`u32`) followed by
//! `[8-byte persistent id][f64 value]` records, envelope count (`u8`)
//! followed by `[u32 target][u8 curve preset]` records. Loading is
//! strict and transactional: the whole stream is parsed and validated
//! before anything is applied, so a version or type mismatch, an
//! unknown id or a short read aborts with the pre-load state intact.

use std::io::{Read, Write};

use engine::envelope::{ComputeIndex, Envelope, CURVE_PRESETS, MAX_ENVELOPES};
use num_traits::FromPrimitive;

use crate::instrument::Instrument;


/// Version tag of the save format itself.
pub const SAVE_VERSION: u32 = 0;

/// Why a save or load failed.
#[derive(Debug)]
pub enum StateError {
    /// Save version, engine version or instrument type mismatch, or a
    /// value the current parameter table cannot represent.
    Incompatible,
    /// Short read in the middle of a record.
    Truncated,
    /// A persistent parameter id with no counterpart in this build.
    UnknownParam,
    /// Stream error other than end-of-file.
    Io(std::io::Error),
}

impl From<std::io::Error> for StateError {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(error)
        }
    }
}

fn write_u32(writer: &mut impl Write, value: u32) -> Result<(), StateError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_u8(writer: &mut impl Write, value: u8) -> Result<(), StateError> {
    writer.write_all(&[value])?;
    Ok(())
}

fn write_f64(writer: &mut impl Write, value: f64) -> Result<(), StateError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_u32(reader: &mut impl Read) -> Result<u32, StateError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u8(reader: &mut impl Read) -> Result<u8, StateError> {
    let mut bytes = [0u8; 1];
    reader.read_exact(&mut bytes)?;
    Ok(bytes[0])
}

fn read_f64(reader: &mut impl Read) -> Result<f64, StateError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(f64::from_le_bytes(bytes))
}

/// Serializes the instrument's parameters and envelope list.
///
/// # Errors
///
/// Fails only on writer errors.
pub fn save(instrument: &Instrument, writer: &mut impl Write) -> Result<(), StateError> {
    write_u32(writer, SAVE_VERSION)?;
    let (major, minor, revision) = engine::VERSION;
    write_u32(writer, major)?;
    write_u32(writer, minor)?;
    write_u32(writer, revision)?;

    write_u8(writer, instrument.kind().tag())?;

    let ids: Vec<u32> = instrument.param_ids().collect();
    write_u32(writer, ids.len() as u32)?;
    for id in ids {
        let info = instrument.param_info(id).ok_or(StateError::Incompatible)?;
        let value = instrument.get_param(id).ok_or(StateError::Incompatible)?;
        writer.write_all(&info.id)?;
        write_f64(writer, value)?;
    }

    let synth = instrument.synth();
    write_u8(writer, synth.envelope_count() as u8)?;
    for index in 0..synth.envelope_count() {
        let envelope = synth.envelope(index).ok_or(StateError::Incompatible)?;
        write_u32(writer, envelope.target as u32)?;
        write_u8(writer, envelope.curve_preset)?;
    }

    Ok(())
}

/// Restores parameters and envelopes written by [`save`]. Values route
/// through the normal parameter path, so they clamp like host writes.
///
/// The stream is parsed and validated in full before any of it is
/// applied; every error path leaves the instrument untouched.
///
/// # Errors
///
/// Rejects mismatched save or engine versions, a mismatched instrument
/// type, unknown parameter ids, unrepresentable values, invalid
/// envelope records and short reads.
pub fn load(instrument: &mut Instrument, reader: &mut impl Read) -> Result<(), StateError> {
    if read_u32(reader)? != SAVE_VERSION {
        return Err(StateError::Incompatible);
    }
    let version = (read_u32(reader)?, read_u32(reader)?, read_u32(reader)?);
    if version != engine::VERSION {
        return Err(StateError::Incompatible);
    }

    if read_u8(reader)? != instrument.kind().tag() {
        return Err(StateError::Incompatible);
    }

    let record_count = read_u32(reader)?;
    let mut records = Vec::new();
    for _ in 0..record_count {
        let mut persistent_id = [0u8; 8];
        reader.read_exact(&mut persistent_id)?;
        let id = instrument
            .resolve_persistent_id(&persistent_id)
            .ok_or(StateError::UnknownParam)?;
        let value = read_f64(reader)?;
        if value.is_nan() {
            return Err(StateError::Incompatible);
        }
        records.push((id, value));
    }

    let envelope_count = read_u8(reader)?;
    if usize::from(envelope_count) > MAX_ENVELOPES {
        return Err(StateError::Incompatible);
    }
    let mut envelopes = Vec::with_capacity(usize::from(envelope_count));
    for _ in 0..envelope_count {
        let target =
            ComputeIndex::from_u32(read_u32(reader)?).ok_or(StateError::Incompatible)?;
        let curve_preset = read_u8(reader)?;
        if usize::from(curve_preset) >= CURVE_PRESETS.len() {
            return Err(StateError::Incompatible);
        }
        envelopes.push(Envelope {
            target,
            curve_preset,
        });
    }

    // Fully validated; nothing below can fail.
    for (id, value) in records {
        let applied = instrument.set_param(id, value);
        debug_assert!(applied.is_ok());
    }
    let synth = instrument.synth_mut();
    synth.clear_envelopes();
    for envelope in envelopes {
        synth.add_envelope();
        let index = synth.envelope_count() - 1;
        synth.set_envelope(index, envelope);
    }

    Ok(())
}
