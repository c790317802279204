//! Configuration block persisted in the last 4 KiB sector of flash.

use embassy_rp::flash::{Blocking, Error, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use expression_core::storage::ConfigStore;
use expression_core::BLOCK_SIZE;

/// Size of the on-board QSPI flash (Raspberry Pi Pico).
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

const CONFIG_OFFSET: u32 = (FLASH_SIZE - ERASE_SIZE) as u32;

pub struct FlashStore<'d> {
    flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>,
}

impl<'d> FlashStore<'d> {
    #[must_use]
    pub fn new(flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>) -> Self {
        Self { flash }
    }
}

impl ConfigStore for FlashStore<'_> {
    type Error = Error;

    fn load(&mut self, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), Error> {
        self.flash.blocking_read(CONFIG_OFFSET, buf)
    }

    fn save(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<(), Error> {
        self.flash
            .blocking_erase(CONFIG_OFFSET, CONFIG_OFFSET + ERASE_SIZE as u32)?;
        self.flash.blocking_write(CONFIG_OFFSET, block)
    }
}
