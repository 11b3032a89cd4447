//! Bilingual corpus parsing
//!
//! A corpus file pairs original Go comments with their translations. Lines are
//! CRLF-terminated and grouped into blocks:
//!
//! ```text
//! // Package http provides HTTP client and server implementations.
//! // Get, Head, Post, and PostForm make HTTP requests.
//!
//! // http 包提供了 HTTP 客户端和服务端的实现。
//! // Get、Head、Post 和 PostForm 可以发送 HTTP 请求。
//!
//! /*
//! Block comment in the original.
//! */
//!
//! /*
//! 原文中的块注释。
//! */
//! ```
//!
//! Blocks pair up in order: the first is an original, the next its translation.

use std::fs;
use std::path::Path;

use crate::converter::validate_package;
use crate::error::{DocError, DocResult};

const CRLF: &str = "\r\n";
const BLOCK_OPEN: &str = "/*\r\n";
const BLOCK_CLOSE: &str = "*/\r\n";

/// One comment unit taken from a corpus file.
///
/// `//` blocks keep their CRLF line terminators; `/* */` blocks are stored with
/// bare `\n` line breaks and end with the closing marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CorpusBlock(pub String);

impl CorpusBlock {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_block_comment(&self) -> bool {
        self.0.starts_with("/*")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single original → translated comment mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationEntry {
    pub original: String,
    pub translated: String,
}

impl TranslationEntry {
    pub fn new(original: &str, translated: &str) -> Self {
        TranslationEntry {
            original: original.to_string(),
            translated: translated.to_string(),
        }
    }

    /// Identity pairs carry no translation and are never stored
    pub fn is_identity(&self) -> bool {
        self.original == self.translated
    }
}

/// Package and language encoded in a corpus file name.
///
/// The name has the shape `<package-with-dashes>.<language>.<suffix>`, for
/// example `net-http.cn.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorpusName {
    pub package: String,
    pub language: String,
}

impl CorpusName {
    /// Parse a file name, returning `None` for names with fewer than three
    /// dot-separated segments or whose package is not a plain relative path.
    pub fn parse(file_name: &str) -> Option<Self> {
        let segments: Vec<&str> = file_name.split('.').collect();
        if segments.len() < 3 {
            return None;
        }
        let package = segments[0].replace('-', "/");
        validate_package(&package).ok()?;
        Some(CorpusName {
            package,
            language: segments[segments.len() - 2].to_string(),
        })
    }

    /// Parse the final component of `path`
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::parse)
    }
}

/// Segments corpus text into blocks and pairs them into translation entries
pub struct CorpusParser<'a> {
    input: &'a str,
}

impl<'a> CorpusParser<'a> {
    pub fn new(input: &'a str) -> Self {
        CorpusParser { input }
    }

    /// Split the input into comment blocks.
    ///
    /// The result always has an even length; an unmatched trailing original is
    /// followed by an empty block.
    pub fn parse_blocks(&self) -> Vec<CorpusBlock> {
        let mut blocks = Vec::new();
        let mut pending = String::new();
        let mut in_block_comment = false;

        for line in self.input.split_inclusive('\n') {
            if in_block_comment {
                if line == BLOCK_CLOSE {
                    in_block_comment = false;
                    let mut text = pending.replace(CRLF, "\n");
                    text.push_str("*/");
                    blocks.push(CorpusBlock(text));
                    pending.clear();
                } else {
                    pending.push_str(line);
                }
                continue;
            }

            if line.starts_with("//") {
                pending.push_str(line);
            } else if line == CRLF {
                Self::flush(&mut blocks, &mut pending);
            } else if line == BLOCK_OPEN {
                Self::flush(&mut blocks, &mut pending);
                pending.push_str(line);
                in_block_comment = true;
            }
        }
        Self::flush(&mut blocks, &mut pending);

        if blocks.len() % 2 == 1 {
            blocks.push(CorpusBlock::default());
        }
        blocks
    }

    /// Close the pending block if it holds more than a bare line terminator
    fn flush(blocks: &mut Vec<CorpusBlock>, pending: &mut String) {
        if pending.len() > CRLF.len() {
            blocks.push(CorpusBlock(std::mem::take(pending)));
        } else {
            pending.clear();
        }
    }

    /// Pair blocks as (original, translation) and expand them into entries.
    ///
    /// `/* */` blocks map as a whole. `//` blocks map line by line up to the
    /// shorter of the two blocks; extra lines on either side are dropped.
    pub fn pair_entries(blocks: &[CorpusBlock]) -> Vec<TranslationEntry> {
        let mut entries = Vec::new();
        for pair in blocks.chunks(2) {
            let [original, translation] = pair else {
                continue;
            };
            if translation.is_empty() {
                continue;
            }

            if original.is_block_comment() {
                entries.push(TranslationEntry::new(
                    original.as_str(),
                    translation.as_str(),
                ));
            } else {
                let original_lines = original.as_str().split_terminator(CRLF);
                let translated_lines = translation.as_str().split_terminator(CRLF);
                entries.extend(
                    original_lines
                        .zip(translated_lines)
                        .map(|(o, t)| TranslationEntry::new(o, t)),
                );
            }
        }
        entries.retain(|entry| !entry.is_identity());
        entries
    }

    pub fn parse(&self) -> Vec<TranslationEntry> {
        Self::pair_entries(&self.parse_blocks())
    }
}

/// Read a corpus file from disk and return its translation entries
pub fn load_corpus_file(path: &Path) -> DocResult<Vec<TranslationEntry>> {
    let content = fs::read_to_string(path)
        .map_err(|e| DocError::Corpus(format!("Failed to read '{}': {}", path.display(), e)))?;
    Ok(CorpusParser::new(&content).parse())
}
