//! Compact parameter blob decoder, ridden over `get` as the file
//! `@PARAM/param.pck?withdefaults=1`. Pure function, no engine state.
//!
//! Grounded on `original_source/mavftp.py::MAVFTP.ftp_param_decode`.

use crate::error::ParamDecodeError;

pub const MAGIC_VALUES_ONLY: u16 = 0x671B;
pub const MAGIC_WITH_DEFAULTS: u16 = 0x671C;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ParamType {
    I8 = 1,
    I16 = 2,
    I32 = 3,
    F32 = 4,
}

impl ParamType {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ParamType::I8),
            2 => Some(ParamType::I16),
            3 => Some(ParamType::I32),
            4 => Some(ParamType::F32),
            _ => None,
        }
    }

    fn byte_len(self) -> usize {
        match self {
            ParamType::I8 => 1,
            ParamType::I16 => 2,
            ParamType::I32 => 4,
            ParamType::F32 => 4,
        }
    }
}

/// A decoded parameter value, numerically widened to `f64` so integer types
/// (exact up to 2^53) and `f32` (bit-exact) can share one representation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ParamValue {
    pub value: f64,
    pub ptype: ParamType,
}

fn decode_scalar(bytes: &[u8], ptype: ParamType) -> f64 {
    match ptype {
        ParamType::I8 => bytes[0] as i8 as f64,
        ParamType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        ParamType::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        ParamType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
    }
}

fn encode_scalar(value: f64, ptype: ParamType, out: &mut Vec<u8>) {
    match ptype {
        ParamType::I8 => out.push(value as i8 as u8),
        ParamType::I16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
        ParamType::I32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
        ParamType::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamEntry {
    pub name: Vec<u8>,
    pub value: ParamValue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    pub params: Vec<ParamEntry>,
    /// `Some` only when the blob carried defaults (magic `0x671C`).
    pub defaults: Option<Vec<ParamEntry>>,
}

/// Decode a compact parameter blob: `magic:u16, num_params:u16,
/// total_params:u16` header followed by name-prefix/run-length compressed
/// records.
pub fn decode_param_blob(data: &[u8]) -> Result<ParamTable, ParamDecodeError> {
    if data.len() < 6 {
        return Err(ParamDecodeError::Truncated);
    }
    let magic = u16::from_le_bytes([data[0], data[1]]);
    let total_params = u16::from_le_bytes([data[4], data[5]]);
    let with_defaults = match magic {
        MAGIC_VALUES_ONLY => false,
        MAGIC_WITH_DEFAULTS => true,
        other => return Err(ParamDecodeError::BadMagic { found: other }),
    };

    let mut data = &data[6..];
    let mut params = Vec::new();
    let mut defaults = if with_defaults { Some(Vec::new()) } else { None };
    let mut last_name: Vec<u8> = Vec::new();

    loop {
        while !data.is_empty() && data[0] == 0 {
            data = &data[1..];
        }
        if data.is_empty() {
            break;
        }
        if data.len() < 2 {
            return Err(ParamDecodeError::Truncated);
        }
        let ptype_byte = data[0];
        let plen = data[1];
        let flags = (ptype_byte >> 4) & 0x0F;
        let has_default = with_defaults && (flags & 1) != 0;
        let ptype = ParamType::from_tag(ptype_byte & 0x0F)
            .ok_or(ParamDecodeError::BadType(ptype_byte & 0x0F))?;

        let name_len = (((plen >> 4) & 0x0F) as usize) + 1;
        let common_len = (plen & 0x0F) as usize;
        let type_len = ptype.byte_len();
        let default_len = if has_default { type_len } else { 0 };

        let rest = &data[2..];
        if rest.len() < name_len + type_len + default_len {
            return Err(ParamDecodeError::Truncated);
        }
        let common_len = common_len.min(last_name.len());
        let mut name = last_name[..common_len].to_vec();
        name.extend_from_slice(&rest[..name_len]);

        let value_bytes = &rest[name_len..name_len + type_len];
        let value = decode_scalar(value_bytes, ptype);
        params.push(ParamEntry {
            name: name.clone(),
            value: ParamValue { value, ptype },
        });

        if with_defaults {
            let default_value = if has_default {
                let default_bytes = &rest[name_len + type_len..name_len + type_len + default_len];
                decode_scalar(default_bytes, ptype)
            } else {
                value
            };
            defaults.as_mut().unwrap().push(ParamEntry {
                name: name.clone(),
                value: ParamValue {
                    value: default_value,
                    ptype,
                },
            });
        }

        last_name = name;
        data = &rest[name_len + type_len + default_len..];
    }

    if params.len() as u16 != total_params {
        return Err(ParamDecodeError::CountMismatch {
            decoded: params.len() as u16,
            expected: total_params,
        });
    }

    Ok(ParamTable { params, defaults })
}

/// Encode a parameter table back into the compact blob format, for tests
/// exercising the decode(encode(...)) round-trip law.
pub fn encode_param_blob(table: &ParamTable) -> Vec<u8> {
    let with_defaults = table.defaults.is_some();
    let magic = if with_defaults {
        MAGIC_WITH_DEFAULTS
    } else {
        MAGIC_VALUES_ONLY
    };
    let mut out = Vec::new();
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&(table.params.len() as u16).to_le_bytes());
    out.extend_from_slice(&(table.params.len() as u16).to_le_bytes());

    let mut last_name: Vec<u8> = Vec::new();
    for (i, entry) in table.params.iter().enumerate() {
        let default_value = table.defaults.as_ref().map(|d| d[i].value.value);
        let has_default = with_defaults && default_value != Some(entry.value.value);

        let common_len = entry
            .name
            .iter()
            .zip(last_name.iter())
            .take_while(|(a, b)| a == b)
            .count()
            .min(15);
        let suffix = &entry.name[common_len..];
        let name_len = suffix.len();
        assert!(name_len >= 1 && name_len <= 16, "name chunk must fit in 4 bits + 1");

        let flags = if has_default { 1u8 } else { 0u8 };
        let ptype_byte = (flags << 4) | (entry.value.ptype as u8);
        let plen = (((name_len - 1) as u8) << 4) | (common_len as u8);
        out.push(ptype_byte);
        out.push(plen);
        out.extend_from_slice(suffix);
        encode_scalar(entry.value.value, entry.value.ptype, &mut out);
        if has_default {
            encode_scalar(default_value.unwrap(), entry.value.ptype, &mut out);
        }
        last_name = entry.name.clone();
    }
    out
}
