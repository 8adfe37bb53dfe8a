use std::fs::File;
use std::io::{self, BufWriter, Read};
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use mp2ts_tools::network::UdpTsReader;
use mp2ts_tools::types::parse_pid_list;
use mp2ts_tools::{CancelToken, FilterOptions, Options};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoUtc;

#[derive(Parser)]
#[clap(name = "mp2ts-tools", version, about = "MPEG-TS inspection and PID filtering")]
struct Opt {
    /// Indent JSON output
    #[clap(long, global = true, default_value_t = false)]
    indent: bool,

    /// More log output on stderr (-v info, -vv debug); RUST_LOG overrides
    #[clap(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Elementary stream info from the first PMT
    Info {
        /// File, "-" for stdin or udp://<ip>:<port>
        input: String,
        /// Also print service information from the SDT
        #[clap(long, default_value_t = false)]
        service: bool,
        /// Also print SCTE-35 messages
        #[clap(long, default_value_t = false)]
        scte35: bool,
    },
    /// NAL units per access unit with timestamps, RAI and SEI
    Nal {
        input: String,
        /// Stop after this many pictures, 0 for all
        #[clap(long, default_value_t = 0)]
        max: usize,
        /// Print SEI message names and clocks
        #[clap(long, default_value_t = false)]
        sei: bool,
        /// Print SEI payloads as well
        #[clap(long, default_value_t = false)]
        sei_details: bool,
        /// Print parameter sets
        #[clap(long, default_value_t = false)]
        ps: bool,
        /// Print decoded parameter set fields
        #[clap(long, default_value_t = false)]
        verbose_ps: bool,
        /// Print SMPTE-2038 ancillary data
        #[clap(long, default_value_t = false)]
        anc: bool,
        /// Print SCTE-35 messages
        #[clap(long, default_value_t = false)]
        scte35: bool,
        /// Skip the timestamp statistics
        #[clap(long, default_value_t = false)]
        no_stats: bool,
    },
    /// Parameter sets (SPS, PPS, VPS) of the video streams
    Ps {
        input: String,
        #[clap(long, default_value_t = 0)]
        max: usize,
        /// Print decoded parameter set fields
        #[clap(long, default_value_t = false)]
        verbose_ps: bool,
    },
    /// SCTE-35 messages
    Scte35 { input: String },
    /// Drop PIDs from the stream and its PMT
    Pidfilter {
        input: String,
        /// Whitespace separated PIDs, e.g. "256 257"
        #[clap(long, default_value = "")]
        drop: String,
        /// Output TS file
        #[clap(long)]
        output: PathBuf,
        #[clap(long, default_value_t = false)]
        no_stats: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_timer(ChronoUtc::rfc_3339())
        .init();
}

fn open_input(input: &str) -> anyhow::Result<Box<dyn Read + Send>> {
    if input == "-" {
        return Ok(Box::new(io::stdin()));
    }
    if let Some(addr) = input.strip_prefix("udp://") {
        let rdr = UdpTsReader::bind(addr).with_context(|| format!("listening on {addr}"))?;
        return Ok(Box::new(rdr));
    }
    let f = File::open(input).with_context(|| format!("opening {input}"))?;
    Ok(Box::new(f))
}

fn run(opt: Opt, cancel: &CancelToken) -> anyhow::Result<()> {
    let stdout = BufWriter::new(io::stdout().lock());
    match opt.cmd {
        Cmd::Info {
            input,
            service,
            scte35,
        } => {
            let o = Options {
                indent: opt.indent,
                show_stream_info: true,
                show_service: service,
                show_scte35: scte35,
                ..Default::default()
            };
            let rdr = open_input(&input)?;
            if scte35 {
                mp2ts_tools::parse_info_and_scte35(stdout, rdr, &o, cancel)?;
            } else {
                mp2ts_tools::parse_info(stdout, rdr, &o, cancel)?;
            }
        }
        Cmd::Nal {
            input,
            max,
            sei,
            sei_details,
            ps,
            verbose_ps,
            anc,
            scte35,
            no_stats,
        } => {
            let o = Options {
                max_nr_pictures: max,
                indent: opt.indent,
                show_stream_info: true,
                show_ps: ps || verbose_ps,
                verbose_ps_info: verbose_ps,
                show_nalu: true,
                show_sei: sei || sei_details,
                show_sei_details: sei_details,
                show_smpte2038: anc,
                show_scte35: scte35,
                show_statistics: !no_stats,
                ..Default::default()
            };
            mp2ts_tools::parse_all(stdout, open_input(&input)?, &o, cancel)?;
        }
        Cmd::Ps {
            input,
            max,
            verbose_ps,
        } => {
            let o = Options {
                max_nr_pictures: max,
                indent: opt.indent,
                show_ps: true,
                verbose_ps_info: verbose_ps,
                ..Default::default()
            };
            mp2ts_tools::parse_all(stdout, open_input(&input)?, &o, cancel)?;
        }
        Cmd::Scte35 { input } => {
            let o = Options {
                indent: opt.indent,
                show_scte35: true,
                ..Default::default()
            };
            mp2ts_tools::parse_scte35(stdout, open_input(&input)?, &o, cancel)?;
        }
        Cmd::Pidfilter {
            input,
            drop,
            output,
            no_stats,
        } => {
            let o = FilterOptions {
                pids_to_drop: parse_pid_list(&drop),
                indent: opt.indent,
                show_stream_info: true,
                show_statistics: !no_stats,
            };
            let rdr = open_input(&input)?;
            let out = File::create(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            mp2ts_tools::filter_pids(BufWriter::new(out), stdout, rdr, &o, cancel)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    init_tracing(opt.verbose);

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing up");
            on_signal.cancel();
        }
    });

    tokio::task::spawn_blocking(move || run(opt, &cancel)).await?
}
