//! WASM v1 binary decoding.
//!
//! Extracts the executable surface of a module — function entry addresses,
//! per-function parameter counts, start function id, and the raw byte
//! buffer — into a [`ProgramImage`]. No execution semantics live here.

pub mod leb;

use thiserror::Error;
use tracing::debug;

use crate::module::ProgramImage;
pub use leb::LebError;

/// Magic prefix of a WASM v1 binary: `\0asm` followed by version 1.
const WASM_V1_MAGIC: [u8; 8] = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

/// Tag opening every entry of the type section.
const FUNC_TYPE_TAG: u32 = 0x60;

/// Opcode closing every code region.
const END_OPCODE: u8 = 0x0b;

const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_EXPORT: u8 = 7;
const SECTION_START: u8 = 8;
const SECTION_CODE: u8 = 10;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("not a WASM v1 binary (bad magic)")]
    BadMagic,
    #[error("function type at offset {offset:#x} has tag {tag:#x}, expected 0x60")]
    BadTypeTag { offset: usize, tag: u32 },
    #[error("import descriptor {descriptor} at offset {offset:#x} is not a function import")]
    BadImportDescriptor { offset: usize, descriptor: u32 },
    #[error("type index {index} out of range ({count} types declared)")]
    TypeIndexOutOfRange { index: usize, count: usize },
    #[error("code region of function {func} does not end in the end opcode")]
    UnterminatedFunction { func: usize },
    #[error("function section declares {arities} functions but code provides {addrs} addresses")]
    FunctionCountMismatch { arities: usize, addrs: usize },
    #[error("module truncated at offset {offset:#x}")]
    Truncated { offset: usize },
    #[error(transparent)]
    Leb(#[from] LebError),
}

/// Decode a module's bytes into a [`ProgramImage`].
///
/// Walks the section stream until the buffer is exhausted; any failure
/// aborts the whole decode.
pub fn parse(bytes: &[u8]) -> Result<ProgramImage, DecodeError> {
    if !bytes.starts_with(&WASM_V1_MAGIC) {
        return Err(DecodeError::BadMagic);
    }
    let mut reader = Reader::new(bytes, WASM_V1_MAGIC.len());
    let mut builder = ImageBuilder::default();
    while !reader.done() {
        let id = reader.byte()?;
        let size = reader.u32()? as usize;
        debug!(section = id, size, "section");
        match id {
            SECTION_TYPE => builder.type_section(&mut reader)?,
            SECTION_IMPORT => builder.import_section(&mut reader)?,
            SECTION_FUNCTION => builder.function_section(&mut reader)?,
            SECTION_START => builder.start_section(&mut reader)?,
            SECTION_CODE => builder.code_section(&mut reader)?,
            // Export names are not modeled.
            SECTION_EXPORT => reader.skip(size)?,
            // Any other section is opaque: advance by the declared size.
            _ => reader.skip(size)?,
        }
    }
    builder.build(bytes)
}

/// Byte-stream reader over the module buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Reader { buf, pos }
    }

    fn done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(byte)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let (value, read) = leb::read_u32(self.buf, self.pos)?;
        self.pos += read;
        Ok(value)
    }

    fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(DecodeError::Truncated {
                offset: self.buf.len(),
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// Accumulates the function tables while walking sections.
#[derive(Default)]
struct ImageBuilder {
    /// Parameter count per declared function type, in declaration order.
    params_per_type: Vec<u32>,
    func_addrs: Vec<Option<u32>>,
    func_arity: Vec<u32>,
    start: Option<u32>,
}

impl ImageBuilder {
    fn arity_of(&self, type_idx: u32) -> Result<u32, DecodeError> {
        self.params_per_type
            .get(type_idx as usize)
            .copied()
            .ok_or(DecodeError::TypeIndexOutOfRange {
                index: type_idx as usize,
                count: self.params_per_type.len(),
            })
    }

    /// Type section: only the parameter count of each type is retained;
    /// parameter and result value types are read and discarded.
    fn type_section(&mut self, reader: &mut Reader) -> Result<(), DecodeError> {
        let count = reader.u32()?;
        for _ in 0..count {
            let offset = reader.pos();
            let tag = reader.u32()?;
            if tag != FUNC_TYPE_TAG {
                return Err(DecodeError::BadTypeTag { offset, tag });
            }
            let param_count = reader.u32()?;
            for _ in 0..param_count {
                reader.u32()?;
            }
            self.params_per_type.push(param_count);
            let result_count = reader.u32()?;
            for _ in 0..result_count {
                reader.u32()?;
            }
        }
        Ok(())
    }

    /// Import section: only function imports are accepted. Each occupies
    /// one slot in the function tables, with an unresolved address.
    fn import_section(&mut self, reader: &mut Reader) -> Result<(), DecodeError> {
        let count = reader.u32()?;
        for _ in 0..count {
            let module_len = reader.u32()? as usize;
            reader.skip(module_len)?;
            let name_len = reader.u32()? as usize;
            reader.skip(name_len)?;
            let offset = reader.pos();
            let descriptor = reader.u32()?;
            if descriptor != 0 {
                return Err(DecodeError::BadImportDescriptor { offset, descriptor });
            }
            let type_idx = reader.u32()?;
            self.func_arity.push(self.arity_of(type_idx)?);
            self.func_addrs.push(None);
        }
        Ok(())
    }

    fn function_section(&mut self, reader: &mut Reader) -> Result<(), DecodeError> {
        let count = reader.u32()?;
        for _ in 0..count {
            let type_idx = reader.u32()?;
            self.func_arity.push(self.arity_of(type_idx)?);
        }
        Ok(())
    }

    fn start_section(&mut self, reader: &mut Reader) -> Result<(), DecodeError> {
        self.start = Some(reader.u32()?);
        Ok(())
    }

    /// Code section: isolate each function's code region by subtracting
    /// the locals preamble from the declared body size. The region's
    /// start offset becomes the function's entry address.
    fn code_section(&mut self, reader: &mut Reader) -> Result<(), DecodeError> {
        let count = reader.u32()?;
        for func in 0..count as usize {
            let body_size = reader.u32()? as usize;
            let preamble_start = reader.pos();
            let local_groups = reader.u32()?;
            for _ in 0..local_groups {
                reader.u32()?; // run length
                reader.u32()?; // value type tag
            }
            let preamble_len = reader.pos() - preamble_start;
            let code_len = body_size
                .checked_sub(preamble_len)
                .ok_or(DecodeError::Truncated {
                    offset: reader.pos(),
                })?;
            let entry = reader.pos() as u32;
            let region = reader.take(code_len)?;
            if region.last() != Some(&END_OPCODE) {
                return Err(DecodeError::UnterminatedFunction { func });
            }
            debug!(func, entry, len = code_len, "code region");
            self.func_addrs.push(Some(entry));
        }
        Ok(())
    }

    fn build(self, bytes: &[u8]) -> Result<ProgramImage, DecodeError> {
        if self.func_addrs.len() != self.func_arity.len() {
            return Err(DecodeError::FunctionCountMismatch {
                arities: self.func_arity.len(),
                addrs: self.func_addrs.len(),
            });
        }
        Ok(ProgramImage {
            func_addrs: self.func_addrs,
            func_arity: self.func_arity,
            start: self.start,
            code: bytes.to_vec(),
        })
    }
}
