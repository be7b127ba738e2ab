//! Tests for the processor module

use super::*;
use crate::error::Error;
use crate::message::Message;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use pretty_assertions::assert_eq;
use std::io::Read;
use test_case::test_case;

fn decompress(algorithm: CompressAlgorithm, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    match algorithm {
        CompressAlgorithm::Gzip => GzDecoder::new(data).read_to_end(&mut out),
        CompressAlgorithm::Zlib => ZlibDecoder::new(data).read_to_end(&mut out),
        CompressAlgorithm::Deflate => DeflateDecoder::new(data).read_to_end(&mut out),
    }
    .unwrap();
    out
}

// ============================================================================
// Archive
// ============================================================================

#[test]
fn test_archive_binary_matches_message_framing() {
    let msg = Message::new(["hello", "world", "!"]);
    let out = ArchiveProcessor::new(ArchiveFormat::Binary)
        .process(msg.clone())
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), 1);
    let archived = out[0].get(0).unwrap();
    assert_eq!(Message::from_binary(archived).unwrap(), msg);
    assert_eq!(&archived[..8], &[0, 0, 0, 3, 0, 0, 0, 5]);
}

#[test_case(ArchiveFormat::Lines, "a\nbb\nccc" ; "lines")]
#[test_case(ArchiveFormat::Concatenate, "abbccc" ; "concatenate")]
fn test_archive_text_formats(format: ArchiveFormat, expected: &str) {
    let out = ArchiveProcessor::new(format)
        .process(Message::new(["a", "bb", "ccc"]))
        .unwrap();
    assert_eq!(out[0].get(0).unwrap().as_ref(), expected.as_bytes());
}

#[test]
fn test_archive_tar_one_entry_per_part() {
    let parts = [
        "hello world first part",
        "hello world second part",
        "third part",
        "fourth",
        "5",
    ];
    let out = ArchiveProcessor::new(ArchiveFormat::Tar)
        .process(Message::new(parts))
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), 1);

    let archived = out[0].get(0).unwrap();
    let mut archive = tar::Archive::new(archived.as_ref());
    let mut names = Vec::new();
    let mut contents = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        names.push(entry.path().unwrap().display().to_string());
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        contents.push(body);
    }

    assert_eq!(contents, parts);
    assert_eq!(names, ["part-0", "part-1", "part-2", "part-3", "part-4"]);
}

#[test_case(ArchiveFormat::Binary ; "binary")]
#[test_case(ArchiveFormat::Lines ; "lines")]
#[test_case(ArchiveFormat::Concatenate ; "concatenate")]
#[test_case(ArchiveFormat::Tar ; "tar")]
fn test_archive_empty_message(format: ArchiveFormat) {
    let out = ArchiveProcessor::new(format)
        .process(Message::empty())
        .unwrap();
    assert!(out.is_empty());
}

// ============================================================================
// Compress
// ============================================================================

#[test_case(CompressAlgorithm::Gzip ; "gzip")]
#[test_case(CompressAlgorithm::Zlib ; "zlib")]
#[test_case(CompressAlgorithm::Deflate ; "deflate")]
fn test_compress_each_part(algorithm: CompressAlgorithm) {
    let payload = "the quick brown fox ".repeat(50);
    let msg = Message::new([payload.clone(), "second".to_string()]);
    let out = CompressProcessor::new(algorithm, 9).process(msg).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), 2);
    let first = out[0].get(0).unwrap();
    assert!(first.len() < payload.len());
    assert_eq!(decompress(algorithm, first), payload.as_bytes());
    assert_eq!(decompress(algorithm, out[0].get(1).unwrap()), b"second");
}

#[test]
fn test_compress_empty_message() {
    let out = CompressProcessor::new(CompressAlgorithm::Gzip, 6)
        .process(Message::empty())
        .unwrap();
    assert!(out.is_empty());
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_processor_config_yaml() {
    let yaml = r#"
- type: archive
  archive:
    format: lines
- type: compress
  compress:
    algorithm: zlib
    level: 3
- type: archive
"#;
    let configs: Vec<ProcessorConfig> = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(
        configs,
        vec![
            ProcessorConfig::Archive {
                archive: ArchiveConfig {
                    format: ArchiveFormat::Lines
                }
            },
            ProcessorConfig::Compress {
                compress: CompressConfig {
                    algorithm: CompressAlgorithm::Zlib,
                    level: 3
                }
            },
            ProcessorConfig::Archive {
                archive: ArchiveConfig::default()
            },
        ]
    );

    let names: Vec<_> = configs
        .iter()
        .map(|c| c.build().unwrap().name())
        .collect();
    assert_eq!(names, vec!["archive", "compress", "archive"]);
}

#[test]
fn test_invalid_compression_level() {
    let config = ProcessorConfig::Compress {
        compress: CompressConfig {
            algorithm: CompressAlgorithm::Gzip,
            level: 12,
        },
    };
    assert!(matches!(config.build(), Err(Error::Config { .. })));
}
