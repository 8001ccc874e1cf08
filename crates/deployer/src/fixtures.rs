use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub enum Entry<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8]),
}

/// Builds a zip archive in memory, entries in the given order.
pub fn zip_bytes(entries: &[Entry<'_>]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for entry in entries {
        match entry {
            Entry::Dir(name) => writer.add_directory(*name, options).unwrap(),
            Entry::File(name, body) => {
                writer.start_file(*name, options).unwrap();
                writer.write_all(body).unwrap();
            }
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, entries: &[Entry<'_>]) {
    std::fs::write(path, zip_bytes(entries)).unwrap();
}
