// External crates
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Controls how captured lines are reassembled before they are appended to a
/// destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineMode {
    /// Concatenate lines with their terminators stripped, `"a\nb\n"` becomes `"ab"`.
    #[default]
    Joined,
    /// Re-emit `\n` after every line that was terminated in the source.
    PreserveBreaks,
}

impl LineMode {
    /// Map the `preserve_line_breaks` configuration flag onto a mode.
    pub fn from_preserve_flag(preserve_line_breaks: bool) -> Self {
        if preserve_line_breaks {
            Self::PreserveBreaks
        } else {
            Self::Joined
        }
    }
}

/// Result of scanning the unread tail of a source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capture {
    /// Reassembled non-empty lines, ready to be appended to a destination.
    pub data: Bytes,
    /// Number of source bytes consumed, terminators and empty lines included.
    /// The cursor advances by this amount.
    pub scanned: u64,
    /// Number of non-empty lines that made it into `data`.
    pub lines: usize,
}

impl Capture {
    /// Nothing was read from the source at all.
    pub fn is_idle(&self) -> bool {
        self.scanned == 0
    }
}

/// Split `buf` into lines on `\n` and collect every non-empty one.
///
/// A trailing `\r` is stripped from each line. The last line is captured
/// even when it has no terminator yet.
pub fn collect_lines(buf: &[u8], mode: LineMode) -> Capture {
    let mut data = BytesMut::with_capacity(buf.len());
    let mut lines = 0;

    let mut rest = buf;
    while !rest.is_empty() {
        let (raw, terminated, tail) = match rest.iter().position(|b| *b == b'\n') {
            Some(idx) => (&rest[..idx], true, &rest[idx + 1..]),
            None => (rest, false, &rest[rest.len()..]),
        };
        rest = tail;

        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        if line.is_empty() {
            continue;
        }

        data.extend_from_slice(line);
        if terminated && mode == LineMode::PreserveBreaks {
            data.put_u8(b'\n');
        }
        lines += 1;
    }

    Capture {
        data: data.freeze(),
        scanned: buf.len() as u64,
        lines,
    }
}

/// Read `reader` to EOF and collect the lines found along the way.
pub async fn scan_new_lines<R>(reader: &mut R, mode: LineMode) -> std::io::Result<Capture>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(collect_lines(&buf, mode))
}
