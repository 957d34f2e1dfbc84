use std::fs;
use std::path::Path;

use log::info;
use roxmltree::{Document, Node, ParsingOptions};

use super::error::{BatchError, Result};

pub fn read_document(path: &Path) -> Result<String> {
    info!("Opening {}...", path.display());
    fs::read_to_string(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_document<'input>(path: &Path, text: &'input str) -> Result<Document<'input>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options).map_err(|source| BatchError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Case-insensitive attribute lookup.
pub fn attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.name().eq_ignore_ascii_case(name))
        .map(|attr| attr.value())
}

pub fn tag_is(node: Node, name: &str) -> bool {
    node.tag_name().name().eq_ignore_ascii_case(name)
}
