//! # Framer
//!
//! Turns the raw text of the control channel into discrete [`Response`]s.
//!
//! A response line is `<3 digits><sep><text>`: `-` as separator opens a multiline block,
//! which is closed only by a later line carrying the **same** code followed by a space.
//! Whatever comes in between belongs to the message text, even lines which look like replies.

use crate::regex::REPLY_LINE_RE;
use crate::types::Response;

/// Incremental response framer for the control channel
#[derive(Debug, Default)]
pub struct ResponseFramer {
    /// bytes of a line which hasn't been terminated yet
    partial: String,
    /// open multiline block: code and collected lines
    block: Option<(u32, Vec<String>)>,
}

impl ResponseFramer {
    /// Instantiates a new, idle, `ResponseFramer`
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the framer is in the middle of a multiline reply
    pub fn in_block(&self) -> bool {
        self.block.is_some()
    }

    /// Feed a chunk of text as read from the socket.
    ///
    /// The chunk may end in the middle of a line; the remainder is kept until the next call.
    /// Returns all the responses completed by this chunk, in wire order.
    pub fn feed(&mut self, chunk: &str) -> Vec<Response> {
        self.partial.push_str(chunk);
        let mut responses = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=pos).collect();
            if let Some(response) = self.feed_line(&line) {
                responses.push(response);
            }
        }
        responses
    }

    /// Feed a single line (terminator optional, `\r\n` and `\n` are both accepted).
    /// Returns the response completed by this line, if any.
    pub fn feed_line(&mut self, line: &str) -> Option<Response> {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        trace!("CC IN: {line}");

        if let Some((code, mut lines)) = self.block.take() {
            lines.push(line.to_string());
            if Self::closes_block(line, code) {
                trace!("closed multiline reply {code} ({} lines)", lines.len());
                return Some(Response::multiline(code, &lines));
            }
            self.block = Some((code, lines));
            return None;
        }

        let Some(caps) = REPLY_LINE_RE.captures(line) else {
            if !line.is_empty() {
                warn!("discarding line outside of any reply: {line:?}");
            }
            return None;
        };
        let code = match caps[1].parse::<u32>() {
            Ok(code) if (100..=599).contains(&code) => code,
            _ => {
                warn!("discarding line with invalid reply code: {line:?}");
                return None;
            }
        };
        match &caps[2] {
            "-" => {
                trace!("opened multiline reply {code}");
                self.block = Some((code, vec![line.to_string()]));
                None
            }
            _ => Some(Response::new(code, line)),
        }
    }

    fn closes_block(line: &str, code: u32) -> bool {
        let bytes = line.as_bytes();
        bytes.len() >= 4
            && bytes[3] == b' '
            && line.is_char_boundary(3)
            && line[..3].parse::<u32>().ok() == Some(code)
    }
}
