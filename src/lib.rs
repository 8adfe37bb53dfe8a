// src/lib.rs
//! MPEG-TS inspection and PID filtering.
//!
//! The analysis runs in [`processor`] turn a transport stream into JSON
//! records (stream info, SDT, parameter sets, access units, SCTE-35 and
//! SMPTE-2038 data, timestamp statistics). [`filter`] rewrites a stream
//! without a set of PIDs while keeping PAT and PMT consistent.

pub mod constants;
pub mod demux;
pub mod error;
pub mod filter;
pub mod network;
pub mod parsers;
pub mod processor;
pub mod psi;
pub mod report;
pub mod stats;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use filter::{FilterStatistics, filter_pids};
pub use processor::{parse_all, parse_info, parse_info_and_scte35, parse_scte35};
pub use types::{CancelToken, FilterOptions, Options};
