//! Reassembly of newline-terminated records from a chunked response body.
//!
//! The transport gives no framing guarantee: a record can arrive split over
//! several reads, or several records can arrive in one read. Bytes are
//! accumulated until a chunk ends with `\n`, at which point the whole buffer
//! is decoded and yielded as one record.

use std::io::{self, Read};

use crate::error::{OpaError, Result};

/// Size of the scratch buffer used for each read.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Iterator of raw chunks, one per successful read, ending at EOF.
pub struct ChunkReader<R> {
    reader: R,
    scratch: Box<[u8]>,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            scratch: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
            done: false,
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.reader.read(&mut self.scratch) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(n) => return Some(Ok(self.scratch[..n].to_vec())),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Debug name of the error the chunked-body decoder raises when the socket
/// closes where a chunk-size line should start.
const CHUNK_DECODER_ERROR: &str = "DecoderError";

/// Errors that mean the server or network closed the stream.
///
/// This is how a watch normally ends, so it is not reported as a failure.
/// A server that drops the connection between chunks, without the final
/// zero-length chunk, surfaces as an `InvalidInput` from the chunk decoder.
pub fn is_connection_closed(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => true,
        io::ErrorKind::InvalidInput => err
            .get_ref()
            .is_some_and(|inner| format!("{:?}", inner) == CHUNK_DECODER_ERROR),
        _ => false,
    }
}

/// Iterator of decoded records built from a chunk iterator.
///
/// Unterminated trailing bytes are dropped when the stream ends.
pub struct Records<I> {
    chunks: I,
    buffer: Vec<u8>,
    finished: bool,
}

impl<I> Records<I>
where
    I: Iterator<Item = io::Result<Vec<u8>>>,
{
    pub fn new(chunks: I) -> Self {
        Self {
            chunks,
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Bytes received but not yet part of a record.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    fn finish(&mut self) {
        self.finished = true;
        if !self.buffer.is_empty() {
            log::debug!(
                "Dropping {} unterminated bytes at end of stream",
                self.buffer.len()
            );
        }
    }
}

impl<I> Iterator for Records<I>
where
    I: Iterator<Item = io::Result<Vec<u8>>>,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while let Some(chunk) = self.chunks.next() {
            match chunk {
                Ok(chunk) => {
                    self.buffer.extend_from_slice(&chunk);
                    if chunk.ends_with(b"\n") {
                        let record = std::mem::take(&mut self.buffer);
                        return match String::from_utf8(record) {
                            Ok(text) => Some(Ok(text)),
                            Err(e) => {
                                self.finished = true;
                                Some(Err(OpaError::Decode(e)))
                            }
                        };
                    }
                }
                Err(e) if is_connection_closed(&e) => {
                    log::debug!("Watch stream closed: {}", e);
                    break;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(OpaError::Io(e)));
                }
            }
        }

        self.finish();
        None
    }
}

/// Records read straight from a response body.
pub fn read_records<R: Read>(reader: R) -> Records<ChunkReader<R>> {
    Records::new(ChunkReader::new(reader))
}
