use crate::parse::{self, DecodeError};

/// The decoded, executable surface of one module (immutable).
///
/// Function tables are indexed by function id: imported functions first in
/// declaration order, then locally defined functions. The two tables are
/// always the same length. Imported functions have no code region and
/// carry an unresolved address.
#[derive(Debug, Clone)]
pub struct ProgramImage {
    pub(crate) func_addrs: Vec<Option<u32>>,
    pub(crate) func_arity: Vec<u32>,
    pub(crate) start: Option<u32>,
    pub(crate) code: Vec<u8>,
}

impl ProgramImage {
    /// Decode a WASM v1 binary.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        parse::parse(bytes)
    }

    /// Convert WAT text to binary and decode it.
    pub fn from_wat(wat: &str) -> Result<Self, anyhow::Error> {
        let bytes = wat::parse_str(wat)?;
        Ok(Self::from_bytes(&bytes)?)
    }

    /// Number of functions, imports included.
    pub fn func_count(&self) -> usize {
        self.func_addrs.len()
    }

    /// First-instruction byte offset per function; `None` for imports.
    pub fn func_addrs(&self) -> &[Option<u32>] {
        &self.func_addrs
    }

    /// Declared parameter count per function.
    pub fn func_arities(&self) -> &[u32] {
        &self.func_arity
    }

    /// Id of the start function, if the module declares one.
    pub fn start(&self) -> Option<u32> {
        self.start
    }

    /// The raw module bytes, fetched by absolute offset at run time.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Resolved address of the start function's first instruction.
    ///
    /// `None` when the module declares no start section, the declared id
    /// is out of range, or the start function is an import.
    pub fn entry_addr(&self) -> Option<u32> {
        self.start
            .and_then(|id| self.func_addrs.get(id as usize).copied())
            .flatten()
    }
}
