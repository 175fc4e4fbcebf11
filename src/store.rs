//! Register store: the server's addressable data spaces
//!
//! Four independent, zero-indexed spaces sized once at construction:
//! coils (bit, read/write), discrete inputs (bit, read-only over the wire),
//! holding registers (16-bit, read/write) and input registers (16-bit,
//! read-only over the wire). All values start at zero.
//!
//! Every access is bounds-checked; out-of-range requests fail with
//! [`ExceptionCode::IllegalDataAddress`] and are never clamped. Multi-value
//! writes validate the full range before mutating, so a single PDU's write is
//! all-or-nothing.

use crate::error::ExceptionCode;

/// Per-space sizes for a [`RegisterStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLayout {
    /// Number of coils (read/write bits)
    pub coils: u16,
    /// Number of discrete inputs (read-only bits)
    pub discrete_inputs: u16,
    /// Number of holding registers (read/write words)
    pub holding_registers: u16,
    /// Number of input registers (read-only words)
    pub input_registers: u16,
}

impl StoreLayout {
    /// Layout with only holding registers, like the classic demo mapping
    pub fn holding_only(count: u16) -> Self {
        Self {
            coils: 0,
            discrete_inputs: 0,
            holding_registers: count,
            input_registers: 0,
        }
    }
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self::holding_only(10)
    }
}

/// In-memory register map shared by all connections
///
/// The store itself is not synchronized; the server wraps it in a single
/// mutex so a multi-register write is never observed half-applied.
#[derive(Debug)]
pub struct RegisterStore {
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
}

impl RegisterStore {
    /// Allocate all four spaces, zero-initialized
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            coils: vec![false; layout.coils as usize],
            discrete_inputs: vec![false; layout.discrete_inputs as usize],
            holding_registers: vec![0; layout.holding_registers as usize],
            input_registers: vec![0; layout.input_registers as usize],
        }
    }

    /// Effective layout of this store
    pub fn layout(&self) -> StoreLayout {
        StoreLayout {
            coils: self.coils.len() as u16,
            discrete_inputs: self.discrete_inputs.len() as u16,
            holding_registers: self.holding_registers.len() as u16,
            input_registers: self.input_registers.len() as u16,
        }
    }

    // u32 arithmetic so start + count cannot wrap u16
    fn check_range(space_size: usize, start: u16, count: u16) -> Result<(), ExceptionCode> {
        if u32::from(start) + u32::from(count) > space_size as u32 {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        Ok(())
    }

    // Slice-based writes take a usize length; anything past the u16 address
    // space can never fit
    fn check_write_len(space_size: usize, start: u16, len: usize) -> Result<(), ExceptionCode> {
        let count = u16::try_from(len).map_err(|_| ExceptionCode::IllegalDataAddress)?;
        Self::check_range(space_size, start, count)
    }

    // ========================================================================
    // Wire-facing reads
    // ========================================================================

    /// Read `count` coils starting at `start`
    pub fn read_coils(&self, start: u16, count: u16) -> Result<Vec<bool>, ExceptionCode> {
        Self::check_range(self.coils.len(), start, count)?;
        Ok(self.coils[start as usize..(start + count) as usize].to_vec())
    }

    /// Read `count` discrete inputs starting at `start`
    pub fn read_discrete_inputs(&self, start: u16, count: u16) -> Result<Vec<bool>, ExceptionCode> {
        Self::check_range(self.discrete_inputs.len(), start, count)?;
        Ok(self.discrete_inputs[start as usize..(start + count) as usize].to_vec())
    }

    /// Read `count` holding registers starting at `start`
    pub fn read_holding_registers(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExceptionCode> {
        Self::check_range(self.holding_registers.len(), start, count)?;
        Ok(self.holding_registers[start as usize..(start + count) as usize].to_vec())
    }

    /// Read `count` input registers starting at `start`
    pub fn read_input_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, ExceptionCode> {
        Self::check_range(self.input_registers.len(), start, count)?;
        Ok(self.input_registers[start as usize..(start + count) as usize].to_vec())
    }

    // ========================================================================
    // Wire-facing writes (coil and holding spaces only)
    // ========================================================================

    /// Write a single coil
    pub fn write_coil(&mut self, address: u16, value: bool) -> Result<(), ExceptionCode> {
        Self::check_range(self.coils.len(), address, 1)?;
        self.coils[address as usize] = value;
        Ok(())
    }

    /// Write a run of coils; validated before any mutation
    pub fn write_coils(&mut self, start: u16, values: &[bool]) -> Result<(), ExceptionCode> {
        Self::check_write_len(self.coils.len(), start, values.len())?;
        self.coils[start as usize..start as usize + values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Write a single holding register
    pub fn write_register(&mut self, address: u16, value: u16) -> Result<(), ExceptionCode> {
        Self::check_range(self.holding_registers.len(), address, 1)?;
        self.holding_registers[address as usize] = value;
        Ok(())
    }

    /// Write a run of holding registers; validated before any mutation
    pub fn write_registers(&mut self, start: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        Self::check_write_len(self.holding_registers.len(), start, values.len())?;
        self.holding_registers[start as usize..start as usize + values.len()]
            .copy_from_slice(values);
        Ok(())
    }

    // ========================================================================
    // Host-side seeding (the embedding application publishes values here;
    // the wire can only read these spaces)
    // ========================================================================

    /// Set a discrete input from the host side
    pub fn set_discrete_input(&mut self, address: u16, value: bool) -> Result<(), ExceptionCode> {
        Self::check_range(self.discrete_inputs.len(), address, 1)?;
        self.discrete_inputs[address as usize] = value;
        Ok(())
    }

    /// Set an input register from the host side
    pub fn set_input_register(&mut self, address: u16, value: u16) -> Result<(), ExceptionCode> {
        Self::check_range(self.input_registers.len(), address, 1)?;
        self.input_registers[address as usize] = value;
        Ok(())
    }
}

impl Default for RegisterStore {
    fn default() -> Self {
        Self::new(StoreLayout::default())
    }
}
