//! Error types shared by the analysis and filtering passes.

use thiserror::Error;

use crate::parsers::DecodeError;

/// How an error affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Contradictory or malformed mandatory structure; the run stops.
    StructuralViolation,
    /// Only the offending unit or record is lost.
    RecordSkip,
    /// Reading or writing failed.
    Io,
    Other,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A second, different SPS id showed up on a PID.
    #[error("PID {pid}: more than one SPS (active id {active}, new id {new})")]
    MultipleSps { pid: u16, active: u32, new: u32 },

    #[error("PID {pid}: cannot set SPS: {source}")]
    MalformedSps {
        pid: u16,
        #[source]
        source: DecodeError,
    },

    #[error("PID {pid}: cannot set PPS: {source}")]
    MalformedPps {
        pid: u16,
        #[source]
        source: DecodeError,
    },

    #[error("PID {pid}: cannot parse SEI NALU: {source}")]
    Sei {
        pid: u16,
        #[source]
        source: DecodeError,
    },

    #[error("PID {0}: no PTS in PES")]
    MissingPts(u16),

    #[error("PID {pid}: SMPTE-2038: {source}")]
    Ancillary {
        pid: u16,
        #[source]
        source: DecodeError,
    },

    #[error("PID 0 carries the PAT and cannot be dropped")]
    DropPat,

    #[error("PID {0} carries a PMT and cannot be dropped")]
    DropPmt(u16),

    #[error("invalid PSI: {0}")]
    Psi(String),

    #[error("no TS sync byte found")]
    SyncNotFound,

    #[error("no PAT found in stream")]
    PatNotFound,

    #[error("PID {pid}: cannot parse SCTE35: {source}")]
    Scte35 {
        pid: u16,
        #[source]
        source: DecodeError,
    },

    #[error("{}", join_errors(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    pub fn psi(msg: impl Into<String>) -> Self {
        Error::Psi(msg.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MultipleSps { .. }
            | Error::MalformedSps { .. }
            | Error::MalformedPps { .. }
            | Error::DropPat
            | Error::DropPmt(_) => ErrorCategory::StructuralViolation,
            Error::MissingPts(_) | Error::Ancillary { .. } => ErrorCategory::RecordSkip,
            Error::Io(_) => ErrorCategory::Io,
            _ => ErrorCategory::Other,
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
