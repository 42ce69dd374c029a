//! Removal of `<think>…</think>` reasoning blocks from model output.
//!
//! Some chat templates let the model emit its reasoning inline even with
//! thinking disabled. The chat bubble must only show the visible answer.

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

/// Incrementally strips reasoning blocks across streaming fragments.
///
/// Tags may be split between fragments, so a short suffix is held back
/// until the next fragment (or [`finish`](Self::finish)) decides it.
#[derive(Debug, Default)]
pub(crate) struct ThinkFilter {
    in_block: bool,
    carry: String,
}

impl ThinkFilter {
    /// Feed one fragment and return the newly visible text.
    pub(crate) fn push(&mut self, fragment: &str) -> String {
        if fragment.is_empty() {
            return String::new();
        }
        self.carry.push_str(fragment);

        let mut visible = String::new();
        loop {
            if self.in_block {
                if let Some(end) = self.carry.find(CLOSE) {
                    self.carry.drain(..end + CLOSE.len());
                    self.in_block = false;
                    continue;
                }
                let keep = CLOSE.len() - 1;
                let cut = floor_boundary(&self.carry, self.carry.len().saturating_sub(keep));
                self.carry.drain(..cut);
                break;
            }

            if let Some(start) = self.carry.find(OPEN) {
                visible.push_str(&self.carry[..start]);
                self.carry.drain(..start + OPEN.len());
                self.in_block = true;
                continue;
            }

            let keep = OPEN.len().max(CLOSE.len()) - 1;
            let emit = floor_boundary(&self.carry, self.carry.len().saturating_sub(keep));
            visible.push_str(&self.carry[..emit]);
            self.carry.drain(..emit);
            break;
        }
        visible
    }

    /// Flush the held-back tail. An unterminated block is dropped.
    pub(crate) fn finish(&mut self) -> String {
        if self.in_block {
            self.carry.clear();
            return String::new();
        }
        std::mem::take(&mut self.carry)
    }
}

/// Strip every reasoning block from a complete reply.
pub(crate) fn strip_think_blocks(text: &str) -> String {
    let mut filter = ThinkFilter::default();
    let mut out = filter.push(text);
    out.push_str(&filter.finish());
    out
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
