//! DMC memory access
//!
//! The delta modulation channel streams its sample bytes straight out of the
//! CPU address space. The host supplies that access as a [`DmcReader`].

/// Host memory access for DMC sample fetches
///
/// The reader is called synchronously from inside an APU operation
/// (`write_register`, `read_status` or `run_frame`) whenever the DMC sample
/// buffer empties, and must return before that operation can continue.
///
/// # Re-entrancy
///
/// A reader must not call back into the APU that invoked it. The APU is
/// mutably borrowed for the whole fetch, so safe Rust rejects this at compile
/// time; readers backed by shared state (`Rc<RefCell<_>>`, `Arc<Mutex<_>>`)
/// must not reach the same APU through it either.
///
/// The returned byte is used as-is; the APU does not validate it.
///
/// # Example
///
/// ```
/// use nes_apu::DmcReader;
///
/// struct Rom(Vec<u8>);
///
/// impl DmcReader for Rom {
///     fn read_byte(&mut self, addr: u16) -> u8 {
///         self.0[(addr as usize - 0x8000) % self.0.len()]
///     }
/// }
///
/// let mut rom = Rom(vec![0xAA; 0x8000]);
/// assert_eq!(rom.read_byte(0xC000), 0xAA);
/// ```
pub trait DmcReader: Send {
    /// Read one byte at CPU address `addr` (always in `0x8000..=0xFFFF`).
    fn read_byte(&mut self, addr: u16) -> u8;
}

impl<F> DmcReader for F
where
    F: FnMut(u16) -> u8 + Send,
{
    #[inline]
    fn read_byte(&mut self, addr: u16) -> u8 {
        self(addr)
    }
}

/// Reader for hosts without sample memory; every fetch returns `value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenBus(pub u8);

impl DmcReader for OpenBus {
    fn read_byte(&mut self, _addr: u16) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_reader() {
        let mut reads = Vec::new();
        {
            let mut reader = |addr: u16| {
                reads.push(addr);
                (addr & 0xFF) as u8
            };
            assert_eq!(reader.read_byte(0xC012), 0x12);
            assert_eq!(reader.read_byte(0xC013), 0x13);
        }
        assert_eq!(reads, vec![0xC012, 0xC013]);
    }

    #[test]
    fn test_open_bus() {
        let mut bus = OpenBus(0x55);
        assert_eq!(bus.read_byte(0x8000), 0x55);
        assert_eq!(bus.read_byte(0xFFFF), 0x55);
    }
}
