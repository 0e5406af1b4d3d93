mod cache;
mod config;
mod driver;
mod error;
mod replace;
mod trace;

use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use log::{error, info};

use crate::{
    cache::Cache,
    config::Config,
    driver::Driver,
    error::{ConfigError, Error, Result},
    trace::Trace,
};

const USAGE: &str = "\
Usage: cachesim [-hv] -s <num> -E <num> -b <num> -t <file>
Options:
  -h                  Print this help message.
  -v                  Echo every memory access with its outcome.
  -s <num>            Number of set index bits (S = 2^s sets).
  -E <num>            Associativity (lines per set).
  -b <num>            Number of block offset bits (B = 2^b bytes per block).
  -t <file>           Trace to replay (valgrind lackey format, optionally .xz).
  --config <json>     Cache parameters as JSON, e.g. {\"set_bits\":4,\"associativity\":1,\"block_bits\":4}.
  -p <path>           Read the JSON cache parameters from a file.
  --json <path>       Write the run totals as JSON.
  --heartbeat <n>     Log progress every n trace events.
  --buffer-size <n>   Events per block handed over by the reader thread.
  --queue-size <n>    Blocks buffered between the reader and the simulator.

Examples:
  cachesim -s 4 -E 1 -b 4 -t traces/yi.trace
  cachesim -v -s 8 -E 2 -b 4 -t traces/yi.trace.xz
";

struct Args {
    verbose: bool,
    config: Config,
    trace_path: PathBuf,
    stats_path: Option<PathBuf>,
    heartbeat_int: u64,
    events_per_block: usize,
    blocks_per_queue: usize,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match parse_args(args).and_then(run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            if matches!(err, Error::Usage(_) | Error::Config(ConfigError::Missing(_))) {
                eprint!("{USAGE}");
            }
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: pico_args::Arguments) -> Result<Args> {
    let verbose = args.contains("-v");

    let file_config = if let Some(json) = args.opt_value_from_str::<_, String>("--config")? {
        Config::from_json(&json)?
    } else if let Some(path) = args.opt_value_from_str::<_, PathBuf>("-p")? {
        let json = fs::read_to_string(&path)
            .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))?;
        Config::from_json(&json)?
    } else {
        Config::default()
    };
    let flags = Config {
        set_bits: args.opt_value_from_str("-s")?,
        associativity: args.opt_value_from_str("-E")?,
        block_bits: args.opt_value_from_str("-b")?,
    };

    let trace_path: PathBuf = args
        .opt_value_from_str("-t")?
        .ok_or_else(|| Error::Usage("Must provide a trace with -t".into()))?;
    let stats_path = args.opt_value_from_str("--json")?;
    let heartbeat_int = args.opt_value_from_str("--heartbeat")?.unwrap_or(0);
    let events_per_block = args
        .opt_value_from_str("--buffer-size")?
        .unwrap_or(1024 * 16);
    let blocks_per_queue = args.opt_value_from_str("--queue-size")?.unwrap_or(32);

    let rest = args.finish();
    if !rest.is_empty() {
        return Err(Error::Usage(format!("Unexpected arguments: {rest:?}")));
    }

    Ok(Args {
        verbose,
        config: file_config.merge(flags),
        trace_path,
        stats_path,
        heartbeat_int,
        events_per_block,
        blocks_per_queue,
    })
}

fn run(args: Args) -> Result<()> {
    let geometry = args.config.to_geometry()?;
    info!(
        "Initializing cache: s={} E={} b={}",
        geometry.set_bits(),
        geometry.ways(),
        geometry.block_bits()
    );
    let cache = Cache::new(geometry)?;
    let mut driver = Driver::new(cache).with_heartbeat(args.heartbeat_int);

    let trace = Trace::read(args.trace_path, args.events_per_block, args.blocks_per_queue)?;

    let mut out = io::stdout().lock();
    for block in trace.rec.iter() {
        let block = block?;
        let verbose = if args.verbose {
            Some(&mut out as &mut dyn Write)
        } else {
            None
        };
        driver.run(&block, verbose)?;
    }
    trace.join();
    info!(
        "Ran {} trace events over {} sets",
        driver.events(),
        driver.cache().n_sets()
    );

    writeln!(out, "{}", driver.stats())?;

    if let Some(stats_path) = args.stats_path {
        let stats_file = fs::File::create(&stats_path)?;
        serde_json::to_writer_pretty(stats_file, &driver.report()).map_err(io::Error::from)?;
        info!("Wrote stats to {}", stats_path.display());
    }
    Ok(())
}
