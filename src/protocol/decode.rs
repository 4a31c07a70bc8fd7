//! Protocol message decoding

use super::constants::{auth, tags};
use super::message::{AuthenticationMessage, BackendMessage, ErrorFields, FieldDescription};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};

/// Maximum message length (1 GB), matching PostgreSQL's own `PQ_LARGE_MESSAGE_LIMIT`.
///
/// Any message whose length field exceeds this value is rejected before
/// allocation to prevent denial-of-service via crafted length headers.
const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

/// Decode one backend message from the front of `data`.
///
/// Returns `Ok(Some((msg, consumed)))` when a complete message was decoded
/// (the caller must advance the buffer by `consumed`), or `Ok(None)` when the
/// buffer does not yet hold a complete message. `Err` is reserved for actual
/// protocol violations; a short buffer is never an error.
pub fn decode_message(data: &mut BytesMut) -> Result<Option<(BackendMessage, usize)>> {
    if data.len() < 5 {
        return Ok(None);
    }

    let tag = data[0];
    let len = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;

    if len < 4 {
        return Err(Error::Protocol(format!(
            "message length {} below protocol minimum",
            len
        )));
    }
    if len > MAX_MESSAGE_LENGTH {
        return Err(Error::Protocol(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_LENGTH
        )));
    }

    if data.len() < len + 1 {
        return Ok(None);
    }

    let msg_data = &data[5..len + 1];

    let msg = match tag {
        tags::AUTHENTICATION => decode_authentication(msg_data)?,
        tags::BACKEND_KEY_DATA => decode_backend_key_data(msg_data)?,
        tags::COMMAND_COMPLETE => decode_command_complete(msg_data)?,
        tags::DATA_ROW => decode_data_row(msg_data)?,
        tags::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(msg_data)?),
        tags::NEGOTIATE_PROTOCOL_VERSION => decode_negotiate_protocol_version(msg_data)?,
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(msg_data)?),
        tags::PARAMETER_STATUS => decode_parameter_status(msg_data)?,
        tags::READY_FOR_QUERY => decode_ready_for_query(msg_data)?,
        tags::ROW_DESCRIPTION => decode_row_description(msg_data)?,
        _ => {
            return Err(Error::Protocol(format!(
                "unknown message tag: 0x{:02X}",
                tag
            )))
        }
    };

    Ok(Some((msg, len + 1)))
}

fn truncated(what: &str) -> Error {
    Error::Protocol(format!("truncated message: {}", what))
}

fn read_cstr(data: &[u8], offset: usize) -> Result<(String, usize)> {
    let end = data[offset..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Protocol("missing null terminator in string".into()))?;
    let value = String::from_utf8_lossy(&data[offset..offset + end]).to_string();
    Ok((value, offset + end + 1))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > data.len() {
        return Err(truncated("32-bit field"));
    }
    Ok(u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]))
}

fn decode_authentication(data: &[u8]) -> Result<BackendMessage> {
    let auth_type = read_u32(data, 0).map_err(|_| truncated("auth type"))?;

    let auth_msg = match auth_type {
        auth::OK => AuthenticationMessage::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
        auth::MD5_PASSWORD => {
            if data.len() < 8 {
                return Err(truncated("MD5 salt"));
            }
            let mut salt = [0u8; 4];
            salt.copy_from_slice(&data[4..8]);
            AuthenticationMessage::Md5Password { salt }
        }
        auth::SASL => {
            // Mechanism list: null-terminated strings, empty string terminates
            let mut mechanisms = Vec::new();
            let remaining = &data[4..];
            let mut offset = 0;
            while offset < remaining.len() {
                match remaining[offset..].iter().position(|&b| b == 0) {
                    Some(end) => {
                        if end == 0 {
                            break;
                        }
                        let mechanism =
                            String::from_utf8_lossy(&remaining[offset..offset + end]).to_string();
                        mechanisms.push(mechanism);
                        offset += end + 1;
                    }
                    None => break,
                }
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthenticationMessage::SaslContinue {
            data: data[4..].to_vec(),
        },
        auth::SASL_FINAL => AuthenticationMessage::SaslFinal {
            data: data[4..].to_vec(),
        },
        other => AuthenticationMessage::Unsupported(other),
    };

    Ok(BackendMessage::Authentication(auth_msg))
}

fn decode_backend_key_data(data: &[u8]) -> Result<BackendMessage> {
    if data.len() < 8 {
        return Err(truncated("backend key data"));
    }
    let process_id = read_u32(data, 0)?;
    let secret_key = read_u32(data, 4)?;
    Ok(BackendMessage::BackendKeyData {
        process_id,
        secret_key,
    })
}

fn decode_command_complete(data: &[u8]) -> Result<BackendMessage> {
    let (tag, _) = read_cstr(data, 0)?;
    Ok(BackendMessage::CommandComplete(tag))
}

fn decode_data_row(data: &[u8]) -> Result<BackendMessage> {
    if data.len() < 2 {
        return Err(truncated("field count"));
    }
    let field_count = i16::from_be_bytes([data[0], data[1]]) as usize;
    let mut fields = Vec::with_capacity(field_count);
    let mut offset = 2;

    for _ in 0..field_count {
        if offset + 4 > data.len() {
            return Err(truncated("field length"));
        }
        let field_len = i32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        offset += 4;

        let field = if field_len == -1 {
            None
        } else {
            let len = field_len as usize;
            if offset + len > data.len() {
                return Err(truncated("field data"));
            }
            let field_bytes = Bytes::copy_from_slice(&data[offset..offset + len]);
            offset += len;
            Some(field_bytes)
        };
        fields.push(field);
    }

    Ok(BackendMessage::DataRow(fields))
}

fn decode_error_fields(data: &[u8]) -> Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    let mut offset = 0;

    loop {
        if offset >= data.len() {
            break;
        }
        let field_type = data[offset];
        offset += 1;
        if field_type == 0 {
            break;
        }

        let (value, next) = read_cstr(data, offset)?;
        offset = next;

        match field_type {
            b'S' => fields.severity = Some(value),
            b'V' => fields.severity_nonlocalized = Some(value),
            b'C' => fields.code = Some(value),
            b'M' => fields.message = Some(value),
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            b'P' => fields.position = Some(value),
            _ => {} // Ignore unknown fields
        }
    }

    Ok(fields)
}

fn decode_negotiate_protocol_version(data: &[u8]) -> Result<BackendMessage> {
    let newest_minor = read_u32(data, 0).map_err(|_| truncated("newest minor version"))?;
    let option_count = read_u32(data, 4).map_err(|_| truncated("option count"))? as usize;

    let mut unsupported_options = Vec::with_capacity(option_count);
    let mut offset = 8;
    for _ in 0..option_count {
        let (name, next) = read_cstr(data, offset)?;
        unsupported_options.push(name);
        offset = next;
    }

    Ok(BackendMessage::NegotiateProtocolVersion {
        newest_minor,
        unsupported_options,
    })
}

fn decode_parameter_status(data: &[u8]) -> Result<BackendMessage> {
    let (name, offset) = read_cstr(data, 0)?;
    if offset >= data.len() {
        return Err(truncated("parameter value"));
    }
    let (value, _) = read_cstr(data, offset)?;
    Ok(BackendMessage::ParameterStatus { name, value })
}

fn decode_ready_for_query(data: &[u8]) -> Result<BackendMessage> {
    if data.is_empty() {
        return Err(truncated("status byte"));
    }
    Ok(BackendMessage::ReadyForQuery { status: data[0] })
}

fn decode_row_description(data: &[u8]) -> Result<BackendMessage> {
    if data.len() < 2 {
        return Err(truncated("field count"));
    }
    let field_count = i16::from_be_bytes([data[0], data[1]]) as usize;
    let mut fields = Vec::with_capacity(field_count);
    let mut offset = 2;

    for _ in 0..field_count {
        let (name, next) = read_cstr(data, offset)?;
        offset = next;

        // Fixed-size remainder: 4+2+4+2+4+2 = 18 bytes
        if offset + 18 > data.len() {
            return Err(truncated("field descriptor"));
        }
        let table_oid = read_u32(data, offset)?;
        offset += 4;
        let column_attr = i16::from_be_bytes([data[offset], data[offset + 1]]);
        offset += 2;
        let type_oid = read_u32(data, offset)?;
        offset += 4;
        let type_size = i16::from_be_bytes([data[offset], data[offset + 1]]);
        offset += 2;
        let type_modifier = i32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        offset += 4;
        let format_code = i16::from_be_bytes([data[offset], data[offset + 1]]);
        offset += 2;

        fields.push(FieldDescription {
            name,
            table_oid,
            column_attr,
            type_oid,
            type_size,
            type_modifier,
            format_code,
        });
    }

    Ok(BackendMessage::RowDescription(fields))
}
