//! Line-digest responder.
//!
//! Every `\n`-terminated line the peer sends is answered with the lowercase
//! hex MD5 of the line (line terminator excluded) followed by `\n`, one frame
//! per digest.  Lines are reassembled across frames; a final line without a
//! terminator is answered when the peer's END arrives.

use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::{Connection, Received};

/// Accumulates received bytes and yields one digest per complete line.
#[derive(Debug, Default)]
pub struct LineDigester {
    partial: Vec<u8>,
    lines: u64,
}

impl LineDigester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a payload; returns the replies for every line it completed.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut replies = Vec::new();
        let mut rest = data;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            replies.push(self.take_line());
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
        replies
    }

    /// Digest any unterminated tail.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    /// Lines digested so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    fn take_line(&mut self) -> String {
        let line = std::mem::take(&mut self.partial);
        self.lines += 1;
        digest_line(&line)
    }
}

/// Reply for one line: `hex(md5(line))` plus `\n`, with surrounding ASCII
/// whitespace (including a trailing `\r`) trimmed first.
pub fn digest_line(line: &[u8]) -> String {
    let line = line.trim_ascii();
    let mut reply = hex::encode(Md5::digest(line));
    reply.push('\n');
    reply
}

/// Answer lines until the peer's END, then close the connection.
///
/// Returns the number of lines answered.
pub async fn run<S>(conn: &mut Connection<S>) -> anyhow::Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut digester = LineDigester::new();
    loop {
        match conn.receive().await? {
            Received::Data(payload) => {
                for reply in digester.push(&payload) {
                    log::debug!("[md5] → {}", reply.trim_end());
                    conn.send(reply.as_bytes()).await?;
                }
            }
            Received::End => break,
        }
    }
    if let Some(reply) = digester.finish() {
        conn.send(reply.as_bytes()).await?;
    }
    conn.close().await?;
    log::info!("[md5] answered {} lines", digester.lines());
    Ok(digester.lines())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592\n";
    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e\n";

    #[test]
    fn digest_matches_known_vectors() {
        assert_eq!(digest_line(b"hello"), HELLO_MD5);
        assert_eq!(digest_line(b""), EMPTY_MD5);
        assert_eq!(digest_line(b"hello\r"), HELLO_MD5);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(digest_line(b"  hello\t\r"), HELLO_MD5);
        assert_eq!(digest_line(b" \t "), EMPTY_MD5);
        assert_ne!(digest_line(b"hel lo"), HELLO_MD5);
    }

    #[test]
    fn lines_split_across_payloads() {
        let mut d = LineDigester::new();
        assert!(d.push(b"hel").is_empty());
        assert_eq!(d.push(b"lo\nhe"), vec![HELLO_MD5]);
        assert_eq!(d.push(b"llo\r\n"), vec![HELLO_MD5]);
        assert_eq!(d.lines(), 2);
        assert_eq!(d.finish(), None);
    }

    #[test]
    fn several_lines_in_one_payload() {
        let mut d = LineDigester::new();
        let replies = d.push(b"hello\n\nhello\n");
        assert_eq!(replies, vec![HELLO_MD5, EMPTY_MD5, HELLO_MD5]);
    }

    #[test]
    fn unterminated_tail_digested_on_finish() {
        let mut d = LineDigester::new();
        assert!(d.push(b"hello").is_empty());
        assert_eq!(d.finish().as_deref(), Some(HELLO_MD5));
        assert_eq!(d.finish(), None);
    }
}
