//! The tiny Quill front end. The middle-end treats parsing as an external
//! collaborator; this parser exists so the binary has something to feed the
//! pipeline and so tests can write programs as source text.

use std::path::PathBuf;

pub mod parser;

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}

impl SourceFile {
    pub fn from_memory(contents: &str) -> Self {
        Self {
            contents: contents.to_owned(),
            origin: SourceFileOrigin::Memory,
        }
    }

    pub fn from_file(path: PathBuf) -> std::io::Result<Self> {
        Ok(Self {
            contents: std::fs::read_to_string(&path)?,
            origin: SourceFileOrigin::File(path),
        })
    }

    pub fn row_for_position(&self, position: usize) -> usize {
        self.contents[..position.min(self.contents.len())]
            .chars()
            .filter(|c| *c == '\n')
            .count()
            + 1
    }

    pub fn column_for_position(&self, position: usize) -> usize {
        let position = position.min(self.contents.len());
        match self.contents[..position].rfind('\n') {
            Some(newline) => position - newline,
            None => position + 1,
        }
    }
}
