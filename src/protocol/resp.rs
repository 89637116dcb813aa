use atoi::FromRadix10SignedChecked;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest bulk string accepted from a client
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest `+`/`-`/`:`/header line accepted before its CRLF
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Deepest array nesting accepted; command frames are flat
pub const MAX_DEPTH: usize = 32;

/// RESP (REdis Serialization Protocol) data types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  /// Simple strings, used for simple responses like "OK"
  SimpleString(String),
  /// Errors
  Error(String),
  /// Integers
  Integer(i64),
  /// Bulk strings, used for binary-safe strings (can be null)
  BulkString(Option<Vec<u8>>),
  /// Arrays of other values (can be null)
  Array(Option<Vec<Value>>),
}

impl Value {
  /// Create a simple OK response
  pub fn ok() -> Self {
    Value::SimpleString("OK".to_string())
  }

  /// Create an error response
  pub fn error(msg: impl Into<String>) -> Self {
    Value::Error(msg.into())
  }

  pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
    Value::BulkString(Some(data.into()))
  }

  /// Encode to RESP bytes
  pub fn encode(&self) -> Bytes {
    let mut buf = BytesMut::new();
    self.encode_into(&mut buf);
    buf.freeze()
  }

  pub fn encode_into(&self, buf: &mut BytesMut) {
    match self {
      Value::SimpleString(s) => text_line(buf, b'+', s),
      Value::Error(e) => text_line(buf, b'-', e),
      Value::Integer(i) => line(buf, b':', i.to_string().as_bytes()),
      Value::BulkString(None) => buf.put_slice(b"$-1\r\n"),
      Value::BulkString(Some(data)) => {
        line(buf, b'$', data.len().to_string().as_bytes());
        buf.put_slice(data);
        buf.put_slice(b"\r\n");
      }
      Value::Array(None) => buf.put_slice(b"*-1\r\n"),
      Value::Array(Some(items)) => {
        line(buf, b'*', items.len().to_string().as_bytes());
        for item in items {
          item.encode_into(buf);
        }
      }
    }
  }
}

fn line(buf: &mut BytesMut, prefix: u8, body: &[u8]) {
  buf.put_u8(prefix);
  buf.put_slice(body);
  buf.put_slice(b"\r\n");
}

/// Simple strings and errors can't carry CR or LF; they become spaces
fn text_line(buf: &mut BytesMut, prefix: u8, text: &str) {
  buf.put_u8(prefix);
  buf.extend(
    text
      .bytes()
      .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
  );
  buf.put_slice(b"\r\n");
}

/// Why a buffer did not yield a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
  /// More bytes are needed
  #[error("incomplete frame")]
  Incomplete,
  /// The bytes can never form a valid frame
  #[error("protocol error: {0}")]
  Invalid(&'static str),
}

/// Parser for RESP protocol
pub struct Parser;

impl Parser {
  /// Parse one frame from the front of `buffer`, returning it with the number
  /// of bytes consumed
  pub fn parse(buffer: &[u8]) -> Result<(Value, usize), ParseError> {
    let mut cursor = Cursor { buf: buffer, pos: 0 };
    let value = cursor.value(0)?;
    Ok((value, cursor.pos))
  }
}

struct Cursor<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> Cursor<'a> {
  fn value(&mut self, depth: usize) -> Result<Value, ParseError> {
    let type_byte = *self.buf.get(self.pos).ok_or(ParseError::Incomplete)?;
    self.pos += 1;

    match type_byte {
      b'+' => Ok(Value::SimpleString(self.text()?)),
      b'-' => Ok(Value::Error(self.text()?)),
      b':' => Ok(Value::Integer(self.integer()?)),
      b'$' => self.bulk_string(),
      b'*' => self.array(depth),
      _ => Err(ParseError::Invalid("unknown type byte")),
    }
  }

  fn bulk_string(&mut self) -> Result<Value, ParseError> {
    let len = match self.length()? {
      Some(len) => len,
      None => return Ok(Value::BulkString(None)),
    };
    if len > MAX_BULK_LEN {
      return Err(ParseError::Invalid("bulk length too large"));
    }

    let end = self.pos + len;
    if self.buf.len() < end + 2 {
      return Err(ParseError::Incomplete);
    }
    if &self.buf[end..end + 2] != b"\r\n" {
      return Err(ParseError::Invalid("bulk string not terminated by CRLF"));
    }

    let data = self.buf[self.pos..end].to_vec();
    self.pos = end + 2;
    Ok(Value::BulkString(Some(data)))
  }

  fn array(&mut self, depth: usize) -> Result<Value, ParseError> {
    if depth >= MAX_DEPTH {
      return Err(ParseError::Invalid("nesting too deep"));
    }
    let count = match self.length()? {
      Some(count) => count,
      None => return Ok(Value::Array(None)),
    };

    // every element takes at least 3 bytes, don't trust count for capacity
    let mut items = Vec::with_capacity(count.min(self.buf.len() / 3 + 1));
    for _ in 0..count {
      items.push(self.value(depth + 1)?);
    }
    Ok(Value::Array(Some(items)))
  }

  /// Length header of a bulk string or array; `None` for the `-1` null form
  fn length(&mut self) -> Result<Option<usize>, ParseError> {
    match self.integer()? {
      -1 => Ok(None),
      n if n < 0 => Err(ParseError::Invalid("negative length")),
      n => Ok(Some(n as usize)),
    }
  }

  fn integer(&mut self) -> Result<i64, ParseError> {
    let line = self.line()?;
    match i64::from_radix_10_signed_checked(line) {
      (Some(n), used) if used == line.len() && !line.is_empty() => Ok(n),
      _ => Err(ParseError::Invalid("invalid integer")),
    }
  }

  fn text(&mut self) -> Result<String, ParseError> {
    Ok(String::from_utf8_lossy(self.line()?).into_owned())
  }

  fn line(&mut self) -> Result<&'a [u8], ParseError> {
    let buf: &'a [u8] = self.buf;
    let rest = &buf[self.pos..];
    let window = &rest[..rest.len().min(MAX_LINE_LEN + 2)];
    let end = match window.windows(2).position(|w| w == b"\r\n") {
      Some(end) => end,
      None if rest.len() > MAX_LINE_LEN + 1 => {
        return Err(ParseError::Invalid("line too long"));
      }
      None => return Err(ParseError::Incomplete),
    };
    self.pos += end + 2;
    Ok(&rest[..end])
  }
}
