//! Address space of executed code.
//!
//! Memory is a set of disjoint regions keyed by base address. Every access
//! must fall entirely inside one live region, so stray pointers trap
//! instead of corrupting neighbouring data. Address 0 never belongs to a
//! region, and regions are separated by unmapped gaps.

use std::collections::BTreeMap;

use crate::error::{Result, Trap};

/// First address handed out.
const BASE: u64 = 0x1_0000;

/// Unmapped bytes left after every region.
const GUARD: u64 = 16;

/// What a region backs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// `alloca` slots, released when their frame returns.
    Stack,
    /// `malloc`ed blocks and host allocations.
    Heap,
    /// Global variables.
    Global,
    /// One-byte placeholder giving a function an address.
    Code,
}

#[derive(Debug)]
struct Region {
    kind: RegionKind,
    bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct Memory {
    regions: BTreeMap<u64, Region>,
    next: u64,
    big_endian: bool,
    stack_bytes: u64,
    stack_limit: u64,
    heap_bytes: u64,
    heap_limit: u64,
}

fn align_up(value: u64, align: u64) -> Option<u64> {
    let align = align.max(1);
    value.div_ceil(align).checked_mul(align)
}

impl Memory {
    pub(crate) fn new(big_endian: bool, stack_limit: u64, heap_limit: u64) -> Self {
        Self {
            regions: BTreeMap::new(),
            next: BASE,
            big_endian,
            stack_bytes: 0,
            stack_limit,
            heap_bytes: 0,
            heap_limit,
        }
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Map a zeroed region of `size` bytes. Stack regions count against the
    /// stack limit, heap and global regions against the heap limit. Nothing
    /// is reserved when a check fails.
    pub(crate) fn reserve(&mut self, kind: RegionKind, size: u64, align: u64) -> Result<u64> {
        let stack_total = self.stack_bytes.saturating_add(size);
        let heap_total = self.heap_bytes.saturating_add(size);
        match kind {
            RegionKind::Stack if stack_total > self.stack_limit => {
                return Err(Trap::StackOverflow(self.stack_limit).into());
            }
            RegionKind::Heap | RegionKind::Global if heap_total > self.heap_limit => {
                return Err(Trap::HeapExhausted {
                    requested: size,
                    limit: self.heap_limit,
                }
                .into());
            }
            _ => {}
        }
        let exhausted = || Trap::AddressSpaceExhausted(size);
        let address = align_up(self.next, align).ok_or_else(exhausted)?;
        let next = address
            .checked_add(size)
            .and_then(|end| end.checked_add(GUARD))
            .ok_or_else(exhausted)?;
        let len = usize::try_from(size).map_err(|_| exhausted())?;
        match kind {
            RegionKind::Stack => self.stack_bytes = stack_total,
            RegionKind::Heap | RegionKind::Global => self.heap_bytes = heap_total,
            RegionKind::Code => {}
        }
        self.next = next;
        self.regions.insert(
            address,
            Region {
                kind,
                bytes: vec![0; len],
            },
        );
        tracing::trace!(?kind, address, size, "region reserved");
        Ok(address)
    }

    /// Release a stack slot. Unknown addresses are ignored.
    pub(crate) fn release_stack(&mut self, address: u64) {
        if let Some(region) = self.regions.remove(&address) {
            self.stack_bytes -= region.bytes.len() as u64;
        }
    }

    /// Allocate `size` zeroed bytes on the heap.
    pub fn allocate(&mut self, size: u64, align: u64) -> Result<u64> {
        self.reserve(RegionKind::Heap, size, align)
    }

    /// Release a heap block. `address` must be the start of a live block.
    pub fn free(&mut self, address: u64) -> Result<()> {
        match self.regions.get(&address) {
            Some(region) if region.kind == RegionKind::Heap => {
                self.heap_bytes -= region.bytes.len() as u64;
                self.regions.remove(&address);
                Ok(())
            }
            _ => Err(Trap::InvalidFree(address).into()),
        }
    }

    /// Kind of the region containing `address`.
    pub fn region_kind(&self, address: u64) -> Option<RegionKind> {
        self.locate(address, 0).ok().map(|(_, region)| region.kind)
    }

    /// Bytes of live heap blocks and globals.
    pub fn heap_bytes(&self) -> u64 {
        self.heap_bytes
    }

    /// Number of live regions of `kind`.
    pub fn count_regions(&self, kind: RegionKind) -> usize {
        self.regions.values().filter(|r| r.kind == kind).count()
    }

    fn locate(&self, address: u64, len: u64) -> Result<(u64, &Region)> {
        let fault = || Trap::OutOfBounds { address, len };
        let (&base, region) = self.regions.range(..=address).next_back().ok_or_else(fault)?;
        let end = address.checked_add(len).ok_or_else(fault)?;
        let within = if len == 0 {
            address <= base + region.bytes.len() as u64
        } else {
            end <= base + region.bytes.len() as u64
        };
        if !within {
            return Err(fault().into());
        }
        Ok((base, region))
    }

    pub fn read(&self, address: u64, len: u64) -> Result<&[u8]> {
        let (base, region) = self.locate(address, len)?;
        let start = (address - base) as usize;
        Ok(&region.bytes[start..start + len as usize])
    }

    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as u64;
        let (base, _) = self.locate(address, len)?;
        let start = (address - base) as usize;
        if let Some(region) = self.regions.get_mut(&base) {
            region.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Copy `len` bytes between possibly overlapping ranges.
    pub fn copy(&mut self, dest: u64, src: u64, len: u64) -> Result<()> {
        let data = self.read(src, len)?.to_vec();
        self.write(dest, &data)
    }

    pub fn fill(&mut self, dest: u64, byte: u8, len: u64) -> Result<()> {
        let (base, _) = self.locate(dest, len)?;
        let start = (dest - base) as usize;
        if let Some(region) = self.regions.get_mut(&base) {
            region.bytes[start..start + len as usize].fill(byte);
        }
        Ok(())
    }

    /// Unsigned integer of `size` bytes (at most 16) in target byte order.
    pub fn read_uint(&self, address: u64, size: u64) -> Result<u128> {
        let bytes = self.read(address, size)?;
        let mut buf = [0u8; 16];
        if self.big_endian {
            buf[16 - bytes.len()..].copy_from_slice(bytes);
            Ok(u128::from_be_bytes(buf))
        } else {
            buf[..bytes.len()].copy_from_slice(bytes);
            Ok(u128::from_le_bytes(buf))
        }
    }

    /// Store the low `size` bytes (at most 16) of `value` in target byte order.
    pub fn write_uint(&mut self, address: u64, size: u64, value: u128) -> Result<()> {
        let size = size.min(16) as usize;
        if self.big_endian {
            let bytes = value.to_be_bytes();
            self.write(address, &bytes[16 - size..])
        } else {
            let bytes = value.to_le_bytes();
            self.write(address, &bytes[..size])
        }
    }

    /// Bytes up to (not including) the first NUL.
    pub fn read_c_string(&self, address: u64) -> Result<Vec<u8>> {
        let (base, region) = self.locate(address, 1)?;
        let tail = &region.bytes[(address - base) as usize..];
        match tail.iter().position(|&b| b == 0) {
            Some(end) => Ok(tail[..end].to_vec()),
            None => Err(Trap::OutOfBounds {
                address,
                len: tail.len() as u64 + 1,
            }
            .into()),
        }
    }

    /// Heap-allocate a NUL-terminated copy of `text`.
    pub fn allocate_c_string(&mut self, text: &str) -> Result<u64> {
        let address = self.allocate(text.len() as u64 + 1, 1)?;
        self.write(address, text.as_bytes())?;
        Ok(address)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
