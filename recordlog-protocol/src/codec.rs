//! Line-delimited JSON codec.
//!
//! Every message is one JSON document followed by a newline. The decoder
//! buffers incoming bytes and yields complete lines as they arrive.

use crate::error::ProtocolError;
use crate::message::{Request, Response};
use crate::MAX_LINE_BYTES;

/// Encodes a value as a JSON line.
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Encodes a request as a JSON line.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, ProtocolError> {
    encode(request)
}

/// Encodes a response as a JSON line.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, ProtocolError> {
    encode(response)
}

/// Incremental line-delimited JSON decoder.
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next JSON line.
    ///
    /// Returns `Ok(Some(value))` if a complete line was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode_line<T: serde::de::DeserializeOwned>(
        &mut self,
    ) -> Result<Option<T>, ProtocolError> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                let json = std::str::from_utf8(&line[..line.len() - 1])
                    .map_err(|_| ProtocolError::InvalidUtf8)?;
                let value: T = serde_json::from_str(json)?;
                Ok(Some(value))
            }
            None => {
                if self.buffer.len() > MAX_LINE_BYTES {
                    return Err(ProtocolError::LineTooLong {
                        size: self.buffer.len(),
                        max: MAX_LINE_BYTES,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Attempts to decode the next request line.
    pub fn decode_request(&mut self) -> Result<Option<Request>, ProtocolError> {
        self.decode_line()
    }

    /// Attempts to decode the next response line.
    pub fn decode_response(&mut self) -> Result<Option<Response>, ProtocolError> {
        self.decode_line()
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}
