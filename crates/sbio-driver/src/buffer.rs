//! The shared buffer
//!
//! 65,536 halfword cells at a 128 KB aligned base address. The write chain
//! stores into it and the read chain loads from it; the CPU only touches it
//! while the chain is disabled (see [`crate::BridgeContext::buffer_mut`]).

use sbio_chip::bus::{self, BUFFER_BYTES, BUFFER_WORDS};
use sbio_chip::dma::TransferSize;

/// Word-addressable shared memory region
#[derive(Clone)]
pub struct SharedBuffer {
    base: u32,
    cells: Box<[u16]>,
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("base", &format_args!("{:#010x}", self.base))
            .field("cells", &self.cells.len())
            .finish()
    }
}

impl SharedBuffer {
    /// Zero-filled buffer at `base`
    pub fn new(base: u32) -> Self {
        Self {
            base,
            cells: vec![0u16; BUFFER_WORDS].into_boxed_slice(),
        }
    }

    /// Base bus address
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Read one cell
    pub fn get(&self, offset: u16) -> u16 {
        self.cells[usize::from(offset)]
    }

    /// Write one cell
    pub fn set(&mut self, offset: u16, value: u16) {
        self.cells[usize::from(offset)] = value;
    }

    /// Fill every cell with `value`
    pub fn fill(&mut self, value: u16) {
        self.cells.fill(value);
    }

    /// All cells
    pub fn as_slice(&self) -> &[u16] {
        &self.cells
    }

    /// All cells, mutable
    pub fn as_mut_slice(&mut self) -> &mut [u16] {
        &mut self.cells
    }

    /// Bus address of a cell
    pub const fn address_of(&self, offset: u16) -> u32 {
        bus::cell_address(self.base, offset)
    }

    /// True if `addr` falls inside the buffer
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr - self.base < BUFFER_BYTES
    }

    /// Bus-level load of one beat at `addr`
    ///
    /// Word loads return two consecutive cells, low cell first.
    pub fn load(&self, addr: u32, size: TransferSize) -> Option<u32> {
        let index = self.index_of(addr)?;
        let low = u32::from(self.cells[index]);
        match size {
            TransferSize::Halfword => Some(low),
            TransferSize::Word => {
                let high = u32::from(*self.cells.get(index + 1)?);
                Some(low | high << 16)
            }
        }
    }

    /// Bus-level store of one beat at `addr`; false if out of range
    pub fn store(&mut self, addr: u32, size: TransferSize, value: u32) -> bool {
        let Some(index) = self.index_of(addr) else {
            return false;
        };
        let [low, high] = split_halves(value);
        match size {
            TransferSize::Halfword => self.cells[index] = low,
            TransferSize::Word => {
                let Some(pair) = self.cells.get_mut(index..index + 2) else {
                    return false;
                };
                pair[0] = low;
                pair[1] = high;
            }
        }
        true
    }

    fn index_of(&self, addr: u32) -> Option<usize> {
        if !self.contains(addr) {
            return None;
        }
        usize::try_from((addr - self.base) / 2).ok()
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn split_halves(value: u32) -> [u16; 2] {
    [value as u16, (value >> 16) as u16]
}
