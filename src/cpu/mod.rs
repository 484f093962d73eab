//! Staged CPU interpreter.
//!
//! Mirrors the hardware pipeline: an explicit state machine advancing one
//! stage per [`Cpu::step`] call through fetch → decode → (immediate fetch)
//! → execute. The operand stack is shared across the whole run; the
//! register file is saved to a window stack on call and restored on return.

mod opcode;

use thiserror::Error;
use tracing::{debug, trace};

use crate::loader::{LoadError, ModuleLoader};
use crate::module::ProgramImage;
use crate::parse::{leb, DecodeError};
pub use opcode::Opcode;

/// Size of the register file, matching the hardware register file.
pub const REGISTER_COUNT: usize = 4;

/// Reserved flat data memory capacity, in bytes.
///
/// Address space only — no opcode in the implemented subset touches it.
pub const MEMORY_SIZE: usize = 1024;

/// Pipeline stage the CPU is in between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    FetchInstr,
    FetchImmediate,
    Decode,
    Execute,
    Halted,
}

/// Fatal execution failure. Aborts the run; the CPU is not reusable.
#[derive(Debug, Error)]
pub enum Trap {
    #[error("unimplemented opcode {byte:#04x} at pc {pc:#x}")]
    UnsupportedOpcode { byte: u8, pc: usize },
    #[error("pc {pc:#x} outside code (len {len:#x})")]
    PcOutOfRange { pc: usize, len: usize },
    #[error("operand stack underflow")]
    OperandUnderflow,
    #[error("return with empty register window stack")]
    WindowUnderflow,
    #[error("register index {index} out of range")]
    RegisterOutOfRange { index: u32 },
    #[error("function {id} out of range ({count} functions)")]
    FunctionOutOfRange { id: u32, count: usize },
    #[error("call to unresolved import function {id}")]
    UnresolvedImport { id: u32 },
    #[error("function {id} declares {arity} parameters, register file holds {REGISTER_COUNT}")]
    ArityTooLarge { id: u32, arity: u32 },
    #[error("immediate LEB128 value not terminated within {} bytes", leb::MAX_BYTES)]
    UnterminatedImmediate,
    #[error("image has no executable start function")]
    NoStartFunction,
    #[error("dynamic load requested but no module loader is attached")]
    NoLoader,
    #[error("dynamic load of module {ordinal} failed")]
    Load {
        ordinal: u32,
        #[source]
        source: LoadError,
    },
    #[error("decode of dynamically loaded module {ordinal} failed")]
    LoadDecode {
        ordinal: u32,
        #[source]
        source: DecodeError,
    },
    #[error("step limit of {limit} exceeded")]
    StepLimit { limit: u64 },
    #[error("cpu is halted")]
    Halted,
}

/// One CPU instance: owns its stacks, registers, and loaded images.
pub struct Cpu {
    /// Absolute byte offset into the active image's code.
    pc: usize,
    registers: [i32; REGISTER_COUNT],
    operand_stack: Vec<i32>,
    /// Saved return program counters.
    call_stack: Vec<usize>,
    /// Saved register snapshots, pushed and popped 1:1 with `call_stack`.
    window_stack: Vec<[i32; REGISTER_COUNT]>,
    /// Ordered loaded images; index 0 is the bootstrap image.
    images: Vec<ProgramImage>,
    image_idx: usize,
    state: Pipeline,
    // Decode-in-progress fields, valid between fetch and execute.
    fetched: u8,
    opcode: Option<Opcode>,
    payload: u32,
    payload_bytes: u32,
    memory: Box<[u8]>,
    loader: Option<Box<dyn ModuleLoader>>,
}

impl Cpu {
    /// Bind a CPU to its bootstrap image, pc at the entry function.
    pub fn new(image: ProgramImage) -> Result<Self, Trap> {
        let entry = image.entry_addr().ok_or(Trap::NoStartFunction)?;
        Ok(Cpu {
            pc: entry as usize,
            registers: [0; REGISTER_COUNT],
            operand_stack: Vec::new(),
            call_stack: Vec::new(),
            window_stack: Vec::new(),
            images: vec![image],
            image_idx: 0,
            state: Pipeline::FetchInstr,
            fetched: 0,
            opcode: None,
            payload: 0,
            payload_bytes: 0,
            memory: vec![0; MEMORY_SIZE].into_boxed_slice(),
            loader: None,
        })
    }

    /// Bind a CPU with a loader for bootstrap dynamic loading.
    pub fn with_loader(image: ProgramImage, loader: Box<dyn ModuleLoader>) -> Result<Self, Trap> {
        let mut cpu = Self::new(image)?;
        cpu.loader = Some(loader);
        Ok(cpu)
    }

    pub fn state(&self) -> Pipeline {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == Pipeline::Halted
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn operand_stack(&self) -> &[i32] {
        &self.operand_stack
    }

    pub fn registers(&self) -> &[i32; REGISTER_COUNT] {
        &self.registers
    }

    /// Index of the image execution currently runs from.
    pub fn active_image(&self) -> usize {
        self.image_idx
    }

    /// Number of images loaded so far (bootstrap included).
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Reserved flat data memory. Defined capacity, no modeled behavior.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Advance exactly one pipeline stage.
    pub fn step(&mut self) -> Result<(), Trap> {
        match self.state {
            Pipeline::FetchInstr => self.fetch_instr(),
            Pipeline::Decode => self.decode(),
            Pipeline::FetchImmediate => self.fetch_immediate(),
            Pipeline::Execute => self.execute(),
            Pipeline::Halted => Err(Trap::Halted),
        }
    }

    /// Drive the pipeline until it halts, under a step ceiling.
    ///
    /// Returns the number of steps taken. The ceiling is the caller's
    /// only timeout mechanism; the CPU itself never suspends.
    pub fn run(&mut self, step_limit: u64) -> Result<u64, Trap> {
        let mut steps = 0;
        while !self.is_halted() {
            if steps >= step_limit {
                return Err(Trap::StepLimit { limit: step_limit });
            }
            self.step()?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Read one code byte at pc from the active image, advancing pc.
    fn fetch(&mut self) -> Result<u8, Trap> {
        let code = &self.images[self.image_idx].code;
        let byte = *code.get(self.pc).ok_or(Trap::PcOutOfRange {
            pc: self.pc,
            len: code.len(),
        })?;
        self.pc += 1;
        Ok(byte)
    }

    fn fetch_instr(&mut self) -> Result<(), Trap> {
        self.opcode = None;
        self.payload = 0;
        self.payload_bytes = 0;
        self.fetched = self.fetch()?;
        trace!(byte = self.fetched, pc = self.pc - 1, "fetch");
        self.state = Pipeline::Decode;
        Ok(())
    }

    fn decode(&mut self) -> Result<(), Trap> {
        let op = Opcode::from_byte(self.fetched).ok_or(Trap::UnsupportedOpcode {
            byte: self.fetched,
            pc: self.pc - 1,
        })?;
        self.opcode = Some(op);
        self.state = if op.has_immediate() {
            Pipeline::FetchImmediate
        } else {
            Pipeline::Execute
        };
        Ok(())
    }

    /// One immediate byte per step; the stage re-enters itself while the
    /// continuation bit is set.
    fn fetch_immediate(&mut self) -> Result<(), Trap> {
        if self.payload_bytes as usize >= leb::MAX_BYTES {
            return Err(Trap::UnterminatedImmediate);
        }
        let byte = self.fetch()?;
        self.payload |= ((byte & 0x7f) as u32) << (7 * self.payload_bytes);
        if byte & 0x80 != 0 {
            self.payload_bytes += 1;
        } else {
            self.state = Pipeline::Execute;
        }
        Ok(())
    }

    fn execute(&mut self) -> Result<(), Trap> {
        let op = self
            .opcode
            .take()
            .expect("EXECUTE entered without a decoded opcode");
        trace!(?op, payload = self.payload, "execute");
        match op {
            Opcode::I32Const => self.operand_stack.push(self.payload as i32),
            Opcode::I32Add => {
                let (a, b) = self.pop2()?;
                self.operand_stack.push(a.wrapping_add(b));
            }
            Opcode::I32Mul => {
                let (a, b) = self.pop2()?;
                self.operand_stack.push(a.wrapping_mul(b));
            }
            Opcode::Drop => {
                self.pop()?;
            }
            Opcode::LocalGet => {
                let value = self.register(self.payload)?;
                self.operand_stack.push(value);
            }
            Opcode::LocalSet => {
                let value = self.pop()?;
                *self.register_mut(self.payload)? = value;
            }
            Opcode::Call => return self.call(self.payload),
            Opcode::End => return self.ret(),
        }
        self.state = Pipeline::FetchInstr;
        Ok(())
    }

    /// Call protocol. On the bootstrap image, with a loader attached, a
    /// call is a dynamic-load request whose immediate names a module
    /// ordinal. Otherwise it saves a register window and return pc, binds
    /// parameters from the operand stack, and jumps to the callee.
    fn call(&mut self, id: u32) -> Result<(), Trap> {
        if self.image_idx == 0 && self.loader.is_some() {
            return self.load_module(id);
        }
        let image = &self.images[self.image_idx];
        let addr = *image
            .func_addrs
            .get(id as usize)
            .ok_or(Trap::FunctionOutOfRange {
                id,
                count: image.func_count(),
            })?;
        let addr = addr.ok_or(Trap::UnresolvedImport { id })?;
        let arity = image.func_arity[id as usize];
        if arity as usize > REGISTER_COUNT {
            return Err(Trap::ArityTooLarge { id, arity });
        }
        self.window_stack.push(self.registers);
        self.call_stack.push(self.pc);
        // Topmost operand becomes register 0. Registers above the arity
        // keep their previous contents.
        for slot in 0..arity as usize {
            self.registers[slot] = self.pop()?;
        }
        self.pc = addr as usize;
        debug!(
            id,
            arity,
            pc = self.pc,
            depth = self.call_stack.len(),
            "call"
        );
        self.state = Pipeline::FetchInstr;
        Ok(())
    }

    /// Return protocol. An empty call stack is the halt condition.
    fn ret(&mut self) -> Result<(), Trap> {
        let Some(pc) = self.call_stack.pop() else {
            debug!(stack = ?self.operand_stack, "entry function returned, halting");
            self.state = Pipeline::Halted;
            return Ok(());
        };
        self.registers = self.window_stack.pop().ok_or(Trap::WindowUnderflow)?;
        self.pc = pc;
        self.state = Pipeline::FetchInstr;
        Ok(())
    }

    /// Resolve, decode, and switch into an additional module image.
    fn load_module(&mut self, ordinal: u32) -> Result<(), Trap> {
        let loader = self.loader.as_ref().ok_or(Trap::NoLoader)?;
        let bytes = loader
            .resolve(ordinal as usize)
            .map_err(|source| Trap::Load { ordinal, source })?;
        let image = ProgramImage::from_bytes(&bytes)
            .map_err(|source| Trap::LoadDecode { ordinal, source })?;
        let entry = image.entry_addr().ok_or(Trap::NoStartFunction)?;
        debug!(ordinal, entry, "loaded module");
        self.images.push(image);
        self.image_idx = self.images.len() - 1;
        self.pc = entry as usize;
        self.state = Pipeline::FetchInstr;
        Ok(())
    }

    fn pop(&mut self) -> Result<i32, Trap> {
        self.operand_stack.pop().ok_or(Trap::OperandUnderflow)
    }

    fn pop2(&mut self) -> Result<(i32, i32), Trap> {
        let a = self.pop()?;
        let b = self.pop()?;
        Ok((a, b))
    }

    fn register(&self, index: u32) -> Result<i32, Trap> {
        self.registers
            .get(index as usize)
            .copied()
            .ok_or(Trap::RegisterOutOfRange { index })
    }

    fn register_mut(&mut self, index: u32) -> Result<&mut i32, Trap> {
        self.registers
            .get_mut(index as usize)
            .ok_or(Trap::RegisterOutOfRange { index })
    }
}
