//! RESP framing
//!
//! Requests are always encoded as arrays of bulk strings. Replies cover RESP2 plus the scalar
//! RESP3 types a server may answer with after `HELLO 3`.

use anyhow::{anyhow, bail, Result};

/// Decoded server reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    /// `None` for the null bulk string
    Bulk(Option<Vec<u8>>),
    /// `None` for the null array; maps and sets are flattened into arrays
    Array(Option<Vec<Reply>>),
    Null,
    Boolean(bool),
    /// Doubles and big numbers, kept in their textual form
    Number(String),
}

impl Reply {
    /// Error message for `-ERR ...` and blob error replies
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Reply::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Cursor of a `[cursor, [elements...]]` iteration reply
    pub fn cursor(&self) -> Option<u64> {
        let Reply::Array(Some(items)) = self else {
            return None;
        };
        match items.as_slice() {
            [Reply::Bulk(Some(cursor)), _] => std::str::from_utf8(cursor).ok()?.parse().ok(),
            [Reply::Simple(cursor), _] => cursor.parse().ok(),
            [Reply::Integer(cursor), _] => u64::try_from(*cursor).ok(),
            _ => None,
        }
    }
}

/// Append `args` to `out` as a RESP array of bulk strings
pub fn encode_command(args: &[Vec<u8>], out: &mut Vec<u8>) -> usize {
    let start = out.len();
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out.len() - start
}

/// Parse one reply from the front of `data`
///
/// Returns `Ok(None)` while the reply is incomplete, otherwise the reply and the number of bytes
/// it occupies.
pub fn parse_reply(data: &[u8]) -> Result<Option<(Reply, usize)>> {
    let Some(&marker) = data.first() else {
        return Ok(None);
    };
    let Some(line_end) = find_crlf(data) else {
        return Ok(None);
    };
    let line = &data[1..line_end];
    let header = line_end + 2;

    let reply = match marker {
        b'+' => Reply::Simple(text(line)?),
        b'-' => Reply::Error(text(line)?),
        b':' => Reply::Integer(number(line)?),
        b'_' => Reply::Null,
        b',' | b'(' => Reply::Number(text(line)?),
        b'#' => match line {
            b"t" => Reply::Boolean(true),
            b"f" => Reply::Boolean(false),
            _ => bail!("Invalid RESP boolean: {}", String::from_utf8_lossy(line)),
        },
        b'$' | b'!' | b'=' => {
            let length = number(line)?;
            if length < 0 {
                return Ok(Some((Reply::Bulk(None), header)));
            }
            let length = length as usize;
            let total = header + length + 2;
            if data.len() < total {
                return Ok(None);
            }
            if &data[header + length..total] != b"\r\n" {
                bail!("Bulk string of length {length} is not terminated by CRLF");
            }
            let body = data[header..header + length].to_vec();
            let reply = match marker {
                b'!' => Reply::Error(String::from_utf8_lossy(&body).into_owned()),
                _ => Reply::Bulk(Some(body)),
            };
            return Ok(Some((reply, total)));
        }
        b'*' | b'~' | b'>' | b'%' | b'|' => {
            let count = number(line)?;
            if count < 0 {
                return Ok(Some((Reply::Array(None), header)));
            }
            // Maps and attributes carry key/value pairs
            let count = match marker {
                b'%' | b'|' => count as usize * 2,
                _ => count as usize,
            };
            let mut items = Vec::with_capacity(count.min(1024));
            let mut offset = header;
            for _ in 0..count {
                match parse_reply(&data[offset..])? {
                    Some((item, used)) => {
                        items.push(item);
                        offset += used;
                    }
                    None => return Ok(None),
                }
            }
            return Ok(Some((Reply::Array(Some(items)), offset)));
        }
        other => return Err(anyhow!("Invalid RESP message type: 0x{other:02x}")),
    };
    Ok(Some((reply, header)))
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn text(line: &[u8]) -> Result<String> {
    Ok(std::str::from_utf8(line).map_err(|e| anyhow!("Invalid RESP line: {e}"))?.to_string())
}

fn number(line: &[u8]) -> Result<i64> {
    let s = std::str::from_utf8(line).map_err(|e| anyhow!("Invalid RESP length: {e}"))?;
    s.parse().map_err(|e| anyhow!("Failed to parse RESP integer '{s}': {e}"))
}
