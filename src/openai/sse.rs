//! Server-sent event framing for streamed OpenAI responses.

use futures::{Stream, StreamExt};

use crate::error::RemoteServiceError;

/// One `event:` / `data:` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name, if the server sent one.
    pub event: Option<String>,
    /// Data lines joined with `\n`.
    pub data: String,
}

impl SseFrame {
    /// Whether this is the `[DONE]` terminator.
    #[must_use]
    pub fn is_done_marker(&self) -> bool {
        self.data == "[DONE]"
    }
}

/// Incremental decoder: feed raw chunks, get complete frames back.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((pos, sep_len)) = find_frame_end(&self.buf) {
            let raw = self.buf.drain(..pos + sep_len).collect::<Vec<_>>();
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&raw[..pos])) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let raw = std::mem::take(&mut self.buf);
        parse_frame(&String::from_utf8_lossy(&raw))
    }
}

/// Decode a streamed response body into frames.
pub fn frames(resp: reqwest::Response) -> impl Stream<Item = Result<SseFrame, RemoteServiceError>> {
    let byte_stream = resp.bytes_stream();

    async_stream::try_stream! {
        let mut decoder = SseDecoder::new();

        futures::pin_mut!(byte_stream);
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            for frame in decoder.push(&chunk) {
                yield frame;
            }
        }
        if let Some(frame) = decoder.finish() {
            yield frame;
        }
    }
}

/// Position and length of the first blank-line separator.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
        // Comments (":") and unknown fields are ignored.
    }

    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"event: thread.message.delta\nda").is_empty());
        let frames = decoder.push(b"ta: {\"a\":1}\n\nevent: done\ndata: [DONE]\n\n");

        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: Some("thread.message.delta".to_string()),
                    data: "{\"a\":1}".to_string(),
                },
                SseFrame {
                    event: Some("done".to_string()),
                    data: "[DONE]".to_string(),
                },
            ]
        );
        assert!(frames[1].is_done_marker());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn handles_crlf_comments_and_multiline_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\r\n\r\ndata: line one\r\ndata: line two\r\n\r\n");

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, None);
        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert!(decoder.finish().unwrap().is_done_marker());
    }
}
