//! Constants for MPEG-TS processing

/// MPEG-TS packet constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;

/// Read-ahead used by the demuxer and the PID filter
pub const READ_BUFFER_PACKETS: usize = 1000;

/// Well-known PIDs
pub const PAT_PID: u16 = 0x0000;
pub const SDT_PID: u16 = 0x0011;

/// PSI table ids
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_SDT_ACTUAL: u8 = 0x42;
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;
pub const TABLE_ID_SCTE35: u8 = 0xFC;

/// PMT stream types
pub const STREAM_TYPE_PRIVATE_DATA: u8 = 0x06;
pub const STREAM_TYPE_AAC: u8 = 0x0F;
pub const STREAM_TYPE_H264: u8 = 0x1B;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_SCTE35: u8 = 0x86;

/// Descriptor tags
pub const DESCRIPTOR_TAG_REGISTRATION: u8 = 0x05;
pub const DESCRIPTOR_TAG_DATA_STREAM_ALIGNMENT: u8 = 0x06;
pub const DESCRIPTOR_TAG_SERVICE: u8 = 0x48;
pub const DESCRIPTOR_TAG_ANC: u8 = 0xC4;

/// Registration format identifier of SMPTE-2038 ancillary streams ("VANC")
pub const ANC_REGISTERED_IDENTIFIER: u32 = 0x5641_4E43;

/// PES constants
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// PTS constants
pub const PTS_CLOCK_HZ: i64 = 90_000; // 90 kHz
pub const PTS_WRAP: i64 = 1 << 33; // 33-bit PTS counter
