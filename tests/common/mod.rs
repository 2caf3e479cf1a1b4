#![allow(dead_code)]

use parquetize::{FileConverter, Schema, WriterConfig, parse_schema};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const TRADES_SCHEMA: &str = r#"{
    "name": "trades",
    "fields": [
        { "name": "id",     "type": "INT32",  "repetition": "REQUIRED" },
        { "name": "symbol", "type": "BINARY", "repetition": "OPTIONAL", "logicalType": "STRING" },
        { "name": "day",    "type": "INT32",  "logicalType": "DATE" },
        { "name": "at",     "type": "INT64",  "logicalType": "TIMESTAMP_MICROS" },
        { "name": "qty",    "type": "INT64" },
        { "name": "price",  "type": "BINARY", "logicalType": "DECIMAL", "precision": 9, "scale": 2 }
    ]
}"#;

pub fn trades_schema() -> Arc<Schema> {
    Arc::new(parse_schema(TRADES_SCHEMA).expect("valid schema"))
}

pub fn trades_converter() -> FileConverter {
    FileConverter::new(trades_schema(), WriterConfig::default())
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

/// Names of the files left in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn temp_leftovers(dir: &Path) -> Vec<String> {
    file_names(dir)
        .into_iter()
        .filter(|n| n.ends_with(".tmp"))
        .collect()
}
