//! Separator-driven text chunker with overlap.
//!
//! Splits extracted text into [`Chunk`]s of at most `chunk_size`
//! characters, carrying up to `chunk_overlap` characters from the tail of
//! each chunk into the head of the next so that context survives chunk
//! boundaries.
//!
//! # Algorithm
//!
//! 1. Split on the separator (`"\n"` by default) and drop empty pieces.
//! 2. Hard-split any piece longer than `chunk_size`, preferring the last
//!    space inside each window. Fragments of one piece are re-joined with
//!    nothing between them; separate pieces are re-joined with the separator.
//! 3. Greedily pack pieces into a window. When the next piece would push
//!    the window past `chunk_size`, emit it, then shed pieces from the
//!    front until what remains is at most `chunk_overlap` characters and
//!    the next piece fits.
//! 4. Trim each emitted chunk and drop whitespace-only ones.
//!
//! Lengths are counted in `char`s, not bytes.
//!
//! # Example
//!
//! ```rust
//! use docchat::chunk::chunk_text;
//! use docchat::config::ChunkingConfig;
//!
//! let chunks = chunk_text("Hello world.\nSecond line.", &ChunkingConfig::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Hello world.\nSecond line.");
//! ```

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

struct Piece<'a> {
    text: &'a str,
    len: usize,
    /// Joins this piece to the one before it inside a chunk.
    glue: &'a str,
    glue_len: usize,
}

/// Split text into overlapping chunks. Empty or whitespace-only text yields
/// no chunks; identical input always yields identical output.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap;
    let pieces = split_pieces(text, &config.separator, size);

    let mut chunks = Vec::new();
    let mut window: VecDeque<Piece> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        if !window.is_empty() && total + piece.glue_len + piece.len > size {
            emit(&mut chunks, &window);
            while let Some(front) = window.front() {
                if total > overlap || total + piece.glue_len + piece.len > size {
                    let shed = front.len + window.get(1).map(|next| next.glue_len).unwrap_or(0);
                    total -= shed;
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
        if !window.is_empty() {
            total += piece.glue_len;
        }
        total += piece.len;
        window.push_back(piece);
    }

    if !window.is_empty() {
        emit(&mut chunks, &window);
    }

    chunks
}

fn emit(chunks: &mut Vec<Chunk>, window: &VecDeque<Piece>) {
    let mut buf = String::new();
    for (i, piece) in window.iter().enumerate() {
        if i > 0 {
            buf.push_str(piece.glue);
        }
        buf.push_str(piece.text);
    }
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        return;
    }
    chunks.push(Chunk {
        index: chunks.len(),
        text: trimmed.to_string(),
    });
}

fn split_pieces<'a>(text: &'a str, separator: &'a str, size: usize) -> Vec<Piece<'a>> {
    let separator_len = separator.chars().count();
    let lines: Vec<&str> = if separator.is_empty() {
        vec![text]
    } else {
        text.split(separator).collect()
    };

    let mut pieces = Vec::new();
    for line in lines.into_iter().filter(|l| !l.is_empty()) {
        for (i, fragment) in hard_split(line, size).into_iter().enumerate() {
            let (glue, glue_len) = if i == 0 { (separator, separator_len) } else { ("", 0) };
            pieces.push(Piece {
                text: fragment,
                len: fragment.chars().count(),
                glue,
                glue_len,
            });
        }
    }
    pieces
}

/// Cut `line` into fragments of at most `size` chars, breaking after the
/// last space of each window when there is one.
fn hard_split(line: &str, size: usize) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut rest = line;
    while rest.chars().count() > size {
        let limit = rest
            .char_indices()
            .nth(size)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = rest[..limit].rfind(' ').map(|pos| pos + 1).unwrap_or(limit);
        fragments.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        fragments.push(rest);
    }
    fragments
}
