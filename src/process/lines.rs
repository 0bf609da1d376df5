//! Bounded line reading over process output pipes.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Longest line handed on in one piece; longer lines are split at this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Append one line to `line`, including its `\n` if one was found.
///
/// Stops after `max` bytes even without a newline, so a writer that never
/// ends a line cannot grow the buffer without bound. Returns the number of
/// bytes appended; 0 means EOF. Bytes are not required to be UTF-8.
pub async fn read_line_capped<R>(reader: &mut R, line: &mut Vec<u8>, max: usize) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let start = line.len();
    loop {
        let room = max - (line.len() - start);
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        let window = &available[..available.len().min(room)];
        let (used, done) = match window.iter().position(|&b| b == b'\n') {
            Some(newline) => (newline + 1, true),
            None => (window.len(), window.len() == room),
        };
        line.extend_from_slice(&window[..used]);
        reader.consume(used);
        if done {
            break;
        }
    }
    Ok(line.len() - start)
}

/// `line` without its trailing `\n` or `\r\n`.
pub fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn read_all(input: &[u8], max: usize) -> Vec<Vec<u8>> {
        let mut reader = BufReader::with_capacity(4, input);
        let mut lines = Vec::new();
        loop {
            let mut line = Vec::new();
            if read_line_capped(&mut reader, &mut line, max).await.unwrap() == 0 {
                return lines;
            }
            lines.push(line);
        }
    }

    #[tokio::test]
    async fn splits_on_newlines_across_buffer_refills() {
        let lines = read_all(b"first line\nsecond\nno newline", 1024).await;
        assert_eq!(lines, vec![b"first line\n".to_vec(), b"second\n".to_vec(), b"no newline".to_vec()]);
    }

    #[tokio::test]
    async fn long_line_is_cut_at_cap() {
        let lines = read_all(b"abcdefghij\nk\n", 4).await;
        assert_eq!(
            lines,
            vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij\n".to_vec(), b"k\n".to_vec()]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_passed_through() {
        let lines = read_all(b"\xff\xfe\nok\n", 1024).await;
        assert_eq!(lines, vec![b"\xff\xfe\n".to_vec(), b"ok\n".to_vec()]);
    }

    #[test]
    fn trims_either_line_ending() {
        assert_eq!(trim_newline(b"a\r\n"), b"a");
        assert_eq!(trim_newline(b"a\n"), b"a");
        assert_eq!(trim_newline(b"a"), b"a");
        assert_eq!(trim_newline(b"a\r"), b"a");
    }
}
