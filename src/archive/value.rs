//! Conversions between primitive payloads, numbers and their text form

use crate::{data_type::DataType, io::parse_num, result::DecodeError};

/// Reads a 1, 2, 4 or 8 byte little endian integer
pub fn int_from_le(bytes: &[u8], signed: bool) -> Option<i128> {
    if !matches!(bytes.len(), 1 | 2 | 4 | 8) {
        return None;
    }
    let negative = signed && bytes.last().is_some_and(|b| b & 0x80 != 0);
    let mut buf = if negative { [0xFF; 16] } else { [0; 16] };
    buf[..bytes.len()].copy_from_slice(bytes);
    Some(i128::from_le_bytes(buf))
}

/// Little endian two's complement representation of `value`, truncated to `size` bytes
pub fn int_to_le(value: i128, size: usize) -> Vec<u8> {
    value.to_le_bytes()[..size.min(16)].to_vec()
}

pub fn real_from_le(bytes: &[u8]) -> Option<f64> {
    match bytes.len() {
        4 => Some(f64::from(f32::from_le_bytes(bytes.try_into().ok()?))),
        8 => Some(f64::from_le_bytes(bytes.try_into().ok()?)),
        _ => None,
    }
}

pub fn real_to_le(value: f64, size: usize) -> Vec<u8> {
    if size == 4 {
        #[expect(clippy::cast_possible_truncation)]
        let narrowed = value as f32;
        narrowed.to_le_bytes().to_vec()
    } else {
        value.to_le_bytes().to_vec()
    }
}

/// The text form of a primitive payload, as stored in the value blob.
///
/// Reals use the shortest representation that reads back to the same value.
pub fn payload_to_text(data_type: &DataType, data: &[u8]) -> Vec<u8> {
    if data_type.is_string() {
        return data.to_vec();
    }
    let text = if data_type.is_integer() || data_type.is_enum() {
        int_from_le(data, data_type.is_signed()).map(|n| n.to_string())
    } else if data_type.is_real() {
        match data.len() {
            4 => data
                .try_into()
                .ok()
                .map(|b| f32::from_le_bytes(b).to_string()),
            8 => data
                .try_into()
                .ok()
                .map(|b| f64::from_le_bytes(b).to_string()),
            _ => None,
        }
    } else if data_type.is_bool() {
        data.first().map(|b| if *b != 0 { "1" } else { "0" }.to_owned())
    } else {
        None
    };
    text.map(String::into_bytes).unwrap_or_default()
}

/// Inverse of [`payload_to_text`]
pub fn text_to_payload(data_type: &DataType, text: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if data_type.is_string() {
        return Ok(text.to_vec());
    }
    if text.is_empty() || data_type.is_pointer() || !data_type.is_primitive() {
        return Ok(Vec::new());
    }
    if data_type.is_integer() || data_type.is_enum() {
        let n: i128 = parse_num(text)?;
        Ok(int_to_le(n, data_type.size()))
    } else if data_type.is_real() {
        if data_type.size() == 4 {
            let n: f32 = parse_num(text)?;
            Ok(n.to_le_bytes().to_vec())
        } else {
            let n: f64 = parse_num(text)?;
            Ok(n.to_le_bytes().to_vec())
        }
    } else if data_type.is_bool() {
        match text {
            b"0" => Ok(vec![0]),
            b"1" => Ok(vec![1]),
            _ => Err(DecodeError::InvalidBool),
        }
    } else {
        Ok(Vec::new())
    }
}

/// Boolean text as accepted by `set_auto_value`
pub fn parse_bool_text(text: &str) -> bool {
    let text = text.trim().to_ascii_lowercase();
    match text.as_str() {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        other => other.parse::<i64>().is_ok_and(|n| n != 0),
    }
}
