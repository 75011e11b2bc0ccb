pub const OPEN_TAG: &str = "<action>";
pub const CLOSE_TAG: &str = "</action>";

/// Watches a streamed reply for the first `<action>…</action>` block.
///
/// Each push only scans the new text plus a look-back of one tag length, so
/// a tag split across fragments is still found without rescanning the buffer.
#[derive(Debug, Default)]
pub struct ActionBlockScanner {
    buffer: String,
    scan_from: usize,
    content_start: Option<usize>,
    block: Option<String>,
}

impl ActionBlockScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns the inner text the first time a block closes;
    /// later fragments are still accumulated but never produce a second block.
    pub fn push(&mut self, fragment: &str) -> Option<&str> {
        self.buffer.push_str(fragment);
        if self.block.is_some() {
            return None;
        }

        if self.content_start.is_none() {
            match self.buffer[self.scan_from..].find(OPEN_TAG) {
                Some(i) => {
                    let start = self.scan_from + i + OPEN_TAG.len();
                    self.content_start = Some(start);
                    self.scan_from = start;
                }
                None => {
                    self.scan_from = self.look_back(OPEN_TAG.len());
                    return None;
                }
            }
        }

        let start = self.content_start?;
        match self.buffer[self.scan_from..].find(CLOSE_TAG) {
            Some(j) => {
                let end = self.scan_from + j;
                self.block = Some(self.buffer[start..end].to_string());
                self.block.as_deref()
            }
            None => {
                self.scan_from = self.look_back(CLOSE_TAG.len()).max(start);
                None
            }
        }
    }

    /// Resume point that re-examines the last `tag_len - 1` bytes.
    fn look_back(&self, tag_len: usize) -> usize {
        let mut pos = self.buffer.len().saturating_sub(tag_len - 1).max(self.scan_from);
        while !self.buffer.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    }

    /// Everything received so far.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn into_parts(self) -> (String, Option<String>) {
        (self.buffer, self.block)
    }
}
