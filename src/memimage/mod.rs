//! Co-simulation memory image rendering.
//!
//! The hardware testbench consumes memory as text: one line per byte,
//! each an 8-character MSB-first binary string. Bytes below the
//! code-start offset are zero, except the self-location byte at
//! [`CODE_BASE`], which holds the code-start offset so the hardware can
//! find its reset vector.

use std::path::Path;

use thiserror::Error;

/// Offset of the self-location byte.
pub const CODE_BASE: usize = 0x40;

/// Offset where the module's bytes are placed.
pub const CODE_AT: usize = 0x50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("memory of {size} bytes cannot hold {needed} bytes of header and code")]
    TooSmall { size: usize, needed: usize },
}

/// One byte as its 8-character MSB-first binary line.
fn bit_line(byte: u8) -> String {
    format!("{byte:08b}")
}

/// Lay out a module's bytes as memory image lines, one per byte.
///
/// `mem_size` must leave room for padding beyond the code: an image with
/// no trailing zero byte is rejected.
pub fn render(data: &[u8], mem_size: usize) -> Result<Vec<String>, ImageError> {
    let needed = CODE_AT + data.len();
    if mem_size <= needed {
        return Err(ImageError::TooSmall {
            size: mem_size,
            needed,
        });
    }
    let mut lines = Vec::with_capacity(mem_size);
    for _ in 0..CODE_BASE {
        lines.push(bit_line(0));
    }
    lines.push(bit_line(CODE_AT as u8));
    for _ in CODE_BASE + 1..CODE_AT {
        lines.push(bit_line(0));
    }
    for &byte in data {
        lines.push(bit_line(byte));
    }
    for _ in 0..mem_size - needed {
        lines.push(bit_line(0));
    }
    Ok(lines)
}

/// Render an image and write it to a file, one line per byte.
pub fn write(data: &[u8], mem_size: usize, out: &Path) -> Result<(), anyhow::Error> {
    let lines = render(data, mem_size)?;
    std::fs::write(out, lines.join("\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_lines_are_msb_first() {
        assert_eq!(bit_line(0), "00000000");
        assert_eq!(bit_line(1), "00000001");
        assert_eq!(bit_line(0xff), "11111111");
        assert_eq!(bit_line(0x50), "01010000");
    }

    #[test]
    fn layout_places_code_at_the_code_start_offset() {
        let data = [0xde, 0xad];
        let lines = render(&data, 256).unwrap();
        assert_eq!(lines.len(), 256);
        // Self-location byte holds the code-start offset.
        assert_eq!(lines[CODE_BASE], bit_line(CODE_AT as u8));
        for (i, line) in lines[..CODE_BASE].iter().enumerate() {
            assert_eq!(line, "00000000", "byte {i}");
        }
        assert_eq!(lines[CODE_AT], bit_line(0xde));
        assert_eq!(lines[CODE_AT + 1], bit_line(0xad));
        for line in &lines[CODE_AT + 2..] {
            assert_eq!(line, "00000000");
        }
    }

    #[test]
    fn rejects_memory_without_room_for_padding() {
        let data = [0u8; 16];
        let needed = CODE_AT + data.len();
        assert_eq!(
            render(&data, needed),
            Err(ImageError::TooSmall {
                size: needed,
                needed
            })
        );
        assert!(render(&data, needed + 1).is_ok());
    }

    #[test]
    fn writes_one_line_per_byte() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mem.txt");
        write(&[0xff], 128, &out).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.lines().count(), 128);
    }
}
