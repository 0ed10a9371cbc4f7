//! Line grammar and block extraction for the run log.
//!
//! A line inside a block is `<key> (' '{4,} | ':') <value>`. The key is the
//! shortest prefix without `:` that is followed by a separator.

use crate::constants::BLOCK_END_KEY;
use crate::error::Result;
use regex::Regex;
use std::io::BufRead;
use tracing::{debug, warn};

/// Key/value pairs of one closed block, in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// 1-based line of the start marker
    pub start_line: usize,
    pub pairs: Vec<(String, String)>,
}

/// Compiled matchers for key/value lines and the block terminator
#[derive(Debug, Clone)]
pub struct LineGrammar {
    key_value: Regex,
    block_end: Regex,
}

impl LineGrammar {
    pub fn new() -> Result<Self> {
        Ok(Self {
            key_value: Regex::new(r"^(?P<key>[^:]+?)(?: {4,}|:)\s*(?P<value>.*)$")?,
            block_end: Regex::new(&format!(
                r"^{}\s*(?::|\s{{4,}})\s*\d+$",
                regex::escape(BLOCK_END_KEY)
            ))?,
        })
    }

    /// Split a line into trimmed key and value, if it matches the grammar
    pub fn key_value(&self, line: &str) -> Option<(String, String)> {
        let caps = self.key_value.captures(line.trim())?;
        let key = caps.name("key")?.as_str().trim();
        if key.is_empty() {
            return None;
        }
        let value = caps.name("value").map_or("", |m| m.as_str()).trim();
        Some((key.to_string(), value.to_string()))
    }

    pub fn closes_block(&self, line: &str) -> bool {
        self.block_end.is_match(line.trim())
    }
}

/// Scans log lines and collects closed blocks
pub(crate) struct BlockExtractor<'g> {
    grammar: &'g LineGrammar,
    marker: &'g str,
    open: Option<RawBlock>,
    blocks: Vec<RawBlock>,
    discarded: usize,
}

impl<'g> BlockExtractor<'g> {
    pub(crate) fn new(grammar: &'g LineGrammar, marker: &'g str) -> Self {
        Self {
            grammar,
            marker,
            open: None,
            blocks: Vec::new(),
            discarded: 0,
        }
    }

    pub(crate) fn feed(&mut self, line_number: usize, line: &str) {
        if line.contains(self.marker) {
            if let Some(unclosed) = self.open.take() {
                warn!(
                    "Discarding unclosed reconciliation block starting at line {}: \
                     new block at line {}",
                    unclosed.start_line, line_number
                );
                self.discarded += 1;
            }
            self.open = Some(RawBlock {
                start_line: line_number,
                pairs: Vec::new(),
            });
            return;
        }

        let Some(block) = self.open.as_mut() else {
            return;
        };
        if let Some(pair) = self.grammar.key_value(line) {
            block.pairs.push(pair);
        }
        if self.grammar.closes_block(line) {
            if let Some(closed) = self.open.take() {
                self.blocks.push(closed);
            }
        }
    }

    /// Closed blocks and the number of discarded ones
    pub(crate) fn finish(mut self) -> (Vec<RawBlock>, usize) {
        if let Some(unclosed) = self.open.take() {
            warn!(
                "Discarding reconciliation block starting at line {}: log ended before '{}'",
                unclosed.start_line, BLOCK_END_KEY
            );
            self.discarded += 1;
        }
        debug!(
            "Extracted {} reconciliation blocks ({} discarded)",
            self.blocks.len(),
            self.discarded
        );
        (self.blocks, self.discarded)
    }
}

/// Extract every closed block from a buffered source. Bytes that are not
/// valid UTF-8 are replaced rather than rejected.
pub fn extract_blocks<R: BufRead>(
    mut reader: R,
    grammar: &LineGrammar,
    marker: &str,
) -> Result<(Vec<RawBlock>, usize)> {
    let mut extractor = BlockExtractor::new(grammar, marker);
    let mut buffer = Vec::new();
    let mut line_number = 0;

    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        line_number += 1;
        let line = String::from_utf8_lossy(&buffer);
        extractor.feed(line_number, line.trim_end_matches(['\r', '\n']));
    }

    Ok(extractor.finish())
}
