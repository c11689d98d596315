use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Framed};
use tracing::{trace, warn};

use super::protocol::Command;
use crate::error::{AcquisitionError, Result};

/// Longest device line accepted; longer lines are skipped.
const MAX_LINE_LENGTH: usize = 1024;

/// Newline-delimited text link to the device.
///
/// Generic over the transport so the serial port and in-memory streams share
/// the same framing. Lines are split on raw bytes and decoded afterwards, so
/// line noise only costs the line it lands in.
pub struct LineLink<T> {
    framed: Framed<T, AnyDelimiterCodec>,
}

impl<T> LineLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: T) -> Self {
        let codec =
            AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_LENGTH);
        Self {
            framed: Framed::new(io, codec),
        }
    }

    /// The underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        self.framed.get_mut()
    }

    /// Next trimmed, non-empty line, or `None` once the device hangs up.
    ///
    /// A line that is not valid UTF-8 comes back as
    /// [`AcquisitionError::MalformedSample`]; the link stays usable.
    ///
    /// Cancel safe: partial input stays buffered in the codec.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            match self.framed.next().await {
                None => return Ok(None),
                Some(Ok(chunk)) => {
                    let line = match std::str::from_utf8(&chunk) {
                        Ok(line) => line.trim(),
                        Err(e) => {
                            return Err(AcquisitionError::malformed(
                                String::from_utf8_lossy(&chunk).trim(),
                                format!("invalid UTF-8: {}", e),
                            ))
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }
                    trace!("<- {}", line);
                    return Ok(Some(line.to_string()));
                }
                Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                    warn!("Skipping device line longer than {} bytes", MAX_LINE_LENGTH);
                }
                Some(Err(AnyDelimiterCodecError::Io(e))) => return Err(AcquisitionError::Link(e)),
            }
        }
    }

    pub async fn send(&mut self, command: &Command) -> Result<()> {
        self.send_line(&command.to_string()).await
    }

    /// Writes `line` followed by a newline.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        trace!("-> {}", line);
        self.framed
            .send(line.trim_end())
            .await
            .map_err(|e| match e {
                AnyDelimiterCodecError::Io(e) => AcquisitionError::Link(e),
                AnyDelimiterCodecError::MaxChunkLengthExceeded => AcquisitionError::Link(
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "line too long"),
                ),
            })
    }
}
