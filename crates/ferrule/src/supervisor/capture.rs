//! Bounded capture of a child's output pipe

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes read from one pipe
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,

    /// Whether bytes past the cap were discarded
    pub truncated: bool,
}

/// Read a pipe to EOF, keeping at most `limit` bytes
///
/// Bytes past the limit are still read and thrown away so the child never
/// blocks on a full pipe. Read errors end the capture early.
pub async fn capture<R>(reader: Option<R>, limit: Option<usize>) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut reader) = reader else {
        return captured;
    };

    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) => {
                debug!(%error, "output pipe read failed");
                break;
            }
        };

        let room = match limit {
            Some(limit) => limit.saturating_sub(captured.bytes.len()),
            None => read,
        };
        let keep = read.min(room);
        captured.bytes.extend_from_slice(&chunk[..keep]);
        if keep < read {
            captured.truncated = true;
        }
    }

    captured
}
