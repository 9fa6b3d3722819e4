//! File ingestion: uploaded files → one concatenated text.
//!
//! Each file is dispatched on its [`DocumentSource`] and the extracted text
//! is appended to a single accumulator with nothing between files. The first
//! extraction failure aborts the whole ingest.

use std::path::PathBuf;

use anyhow::Result;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::error::DocChatError;
use crate::models::UploadedFile;

pub fn ingest_files(files: &[UploadedFile]) -> Result<String, DocChatError> {
    let mut text = String::new();
    for file in files {
        let source = file.source();
        let extracted = source
            .extract_text(&file.bytes)
            .map_err(|err| DocChatError::Extraction {
                file: file.name.clone(),
                source: err,
            })?;
        tracing::debug!(
            file = %file.name,
            kind = source.label(),
            bytes = file.bytes.len(),
            chars = extracted.chars().count(),
            "extracted text"
        );
        text.push_str(&extracted);
    }
    Ok(text)
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    paths.iter().map(|p| UploadedFile::from_path(p)).collect()
}

/// CLI entry point for `docchat extract`: prints the concatenated text.
pub fn run_extract(paths: &[PathBuf]) -> Result<()> {
    let files = read_files(paths)?;
    let text = ingest_files(&files)?;
    println!("{}", text);
    Ok(())
}

/// CLI entry point for `docchat chunks`: prints how the text would be split.
pub fn run_chunks(config: &Config, paths: &[PathBuf], show_text: bool) -> Result<()> {
    let files = read_files(paths)?;
    let text = ingest_files(&files)?;
    let chunks = chunk_text(&text, &config.chunking);

    println!("chunks");
    println!("  files: {}", files.len());
    println!("  characters: {}", text.chars().count());
    println!("  chunks: {}", chunks.len());
    for chunk in &chunks {
        println!("[chunk {}] {} chars", chunk.index, chunk.text.chars().count());
        if show_text {
            println!("{}", chunk.text);
            println!();
        }
    }
    Ok(())
}
