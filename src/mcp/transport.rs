//! Line-delimited stdio framing.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Read one line into `buf`, rejecting lines longer than `max_bytes`.
///
/// An oversized line is drained up to and including its newline so the next
/// read starts on a fresh message, then reported as `InvalidData`. Returns
/// the number of bytes consumed; zero means EOF.
pub async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
    max_bytes: usize,
) -> std::io::Result<usize> {
    let mut total = 0usize;
    let mut raw = Vec::new();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }

        let (end, found_newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if total + end > max_bytes {
            reader.consume(end);
            if !found_newline {
                drain_line(reader).await?;
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Line exceeds {} byte limit", max_bytes),
            ));
        }

        raw.extend_from_slice(&available[..end]);
        total += end;
        reader.consume(end);

        if found_newline {
            break;
        }
    }

    match String::from_utf8(raw) {
        Ok(s) => buf.push_str(&s),
        Err(e) => buf.push_str(&String::from_utf8_lossy(e.as_bytes())),
    }

    Ok(total)
}

async fn drain_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let rest = reader.fill_buf().await?;
        if rest.is_empty() {
            return Ok(());
        }
        match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = rest.len();
                reader.consume(len);
            }
        }
    }
}
