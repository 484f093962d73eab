/// The implemented instruction subset, with WASM v1 encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// 0x0B — closes a function body; halts when the call stack is empty.
    End,
    /// 0x10 — call, or dynamic-load request on the bootstrap image.
    Call,
    /// 0x1A — pop and discard one operand.
    Drop,
    /// 0x20 — push a register onto the operand stack.
    LocalGet,
    /// 0x21 — pop the operand stack into a register.
    LocalSet,
    /// 0x41 — push the immediate onto the operand stack.
    I32Const,
    /// 0x6A — pop two operands, push their sum.
    I32Add,
    /// 0x6C — pop two operands, push their product.
    I32Mul,
}

impl Opcode {
    /// Classify a fetched byte; `None` for anything outside the set.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x0b => Some(Opcode::End),
            0x10 => Some(Opcode::Call),
            0x1a => Some(Opcode::Drop),
            0x20 => Some(Opcode::LocalGet),
            0x21 => Some(Opcode::LocalSet),
            0x41 => Some(Opcode::I32Const),
            0x6a => Some(Opcode::I32Add),
            0x6c => Some(Opcode::I32Mul),
            _ => None,
        }
    }

    /// Whether the opcode is followed by a LEB128 immediate.
    pub fn has_immediate(self) -> bool {
        matches!(
            self,
            Opcode::Call | Opcode::LocalGet | Opcode::LocalSet | Opcode::I32Const
        )
    }
}
