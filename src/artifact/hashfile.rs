use std::io;

use base64::prelude::*;
use sha2::Digest;

/// Writer that computes the SHA-256 of everything passing through it.
pub struct HashedFile<W> {
    writer: W,
    hash: sha2::Sha256,
    size: u64,
}

impl<W> HashedFile<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            hash: sha2::Sha256::new(),
            size: 0,
        }
    }
}

impl<W> HashedFile<W> where W: io::Write {
    /// Flush and return the inner writer, the byte count and the digest as `sha256-<base64>`.
    pub fn finish(mut self) -> io::Result<(W, u64, String)> {
        io::Write::flush(&mut self)?;
        let digest = format_digest(&self.hash.finalize());
        Ok((self.writer, self.size, digest))
    }
}

impl<W> io::Write for HashedFile<W> where W: io::Write {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.hash.update(&buf[..written]);
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

fn format_digest(hash: &[u8]) -> String {
    format!("sha256-{}", BASE64_STANDARD.encode(hash))
}
