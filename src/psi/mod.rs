pub mod pat;
pub mod pmt;
pub mod sdt;
pub mod section;

pub use pat::{PatEntry, PatSection, parse_pat};
pub use pmt::{Descriptor, PmtSection, StreamInfo, parse_pmt};
pub use sdt::{SdtInfo, SdtSection, parse_sdt};
pub use section::{SectionAccumulator, SectionReader, build_section, packetize_section};
