//! TS packet header and adaptation field

use std::io::{self, Read};

use tracing::{debug, warn};

use crate::constants::{TS_HEADER_SIZE, TS_PACKET_SIZE, TS_SYNC_BYTE};
use crate::error::{Error, Result};

/// View over one 188-byte packet
#[derive(Debug, Clone, Copy)]
pub struct TsPacket<'a> {
    raw: &'a [u8; TS_PACKET_SIZE],
}

impl<'a> TsPacket<'a> {
    pub fn new(raw: &'a [u8; TS_PACKET_SIZE]) -> Self {
        Self { raw }
    }

    pub fn pid(&self) -> u16 {
        (((self.raw[1] & 0x1F) as u16) << 8) | self.raw[2] as u16
    }

    pub fn payload_unit_start(&self) -> bool {
        self.raw[1] & 0x40 != 0
    }

    pub fn continuity_counter(&self) -> u8 {
        self.raw[3] & 0x0F
    }

    fn adaptation_field_control(&self) -> u8 {
        (self.raw[3] & 0x30) >> 4
    }

    /// `Some(flag)` when the packet has a non-empty adaptation field
    pub fn random_access_indicator(&self) -> Option<bool> {
        if self.adaptation_field_control() & 0x02 == 0 || self.raw[4] == 0 {
            return None;
        }
        Some(self.raw[5] & 0x40 != 0)
    }

    /// Payload bytes, empty if the packet carries none
    pub fn payload(&self) -> &'a [u8] {
        let afc = self.adaptation_field_control();
        if afc & 0x01 == 0 {
            return &[];
        }
        let mut offset = TS_HEADER_SIZE;
        if afc & 0x02 != 0 {
            offset += 1 + self.raw[4] as usize;
        }
        self.raw.get(offset..).unwrap_or_default()
    }
}

/// Pulls sync-aligned packets from a byte stream.
///
/// Bytes before the first sync byte are skipped. If a packet does not start
/// with the sync byte, the reader searches forward for the next one.
pub struct PacketReader<R> {
    inner: R,
    synced: bool,
    pub(crate) packets_read: u64,
}

impl<R: Read> PacketReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            synced: false,
            packets_read: 0,
        }
    }

    /// Next packet into `buf`. `Ok(false)` on end of stream; a partial
    /// trailing packet is dropped.
    pub fn read_packet(&mut self, buf: &mut [u8; TS_PACKET_SIZE]) -> Result<bool> {
        if !self.find_sync(&mut buf[0])? {
            return Ok(false);
        }
        match self.inner.read_exact(&mut buf[1..]) {
            Ok(()) => {
                self.packets_read += 1;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("dropping partial packet at end of stream");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_sync(&mut self, first: &mut u8) -> Result<bool> {
        let mut byte = [0u8; 1];
        let mut skipped = 0usize;
        loop {
            match self.inner.read_exact(&mut byte) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    if !self.synced && skipped > 0 {
                        return Err(Error::SyncNotFound);
                    }
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
            if byte[0] == TS_SYNC_BYTE {
                break;
            }
            skipped += 1;
        }
        if skipped > 0 {
            if self.synced {
                warn!(skipped, "lost TS sync, resynchronised");
            } else {
                debug!(skipped, "skipped bytes before first sync byte");
            }
        }
        self.synced = true;
        *first = byte[0];
        Ok(true)
    }
}
