#![deny(clippy::unwrap_used)]

use clap::builder::NonEmptyStringValueParser;
use clap::{arg, command, value_parser};
use log::LevelFilter;
use regbridge::dispatch::{Dispatcher, Policy};
use regbridge::proto::{BridgeError, Result};
use regbridge::regmap::{RegisterMap, DEFAULT_MAP_KEY};
use regbridge::session::{Session, SessionConfig};
use regbridge::sink::{CsvSink, FifoSink, JsonSink, Sink, TextSink};
use regbridge::{DEFAULT_BAUDRATE, DEFAULT_HOST, DEFAULT_PORT};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;

/// How emissions are written to the output.
#[derive(Debug, Copy, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

fn output_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(--"format" <fmt> "Output format")
            .required(false)
            .value_parser(value_parser!(OutputFormat)),
    )
    .arg(
        arg!(--"output" <PATH> "Output path")
            .required(false)
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        arg!(--"fifo" <FIFO> "Write engineering values as f64 (LE) to FIFO file")
            .required(false)
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(arg!(
        --"log-points" "Log every decoded point (shown with -dd)"
    ))
}

#[tokio::main]
async fn main() {
    let matches = command!() // requires `cargo` feature
        .arg(
            arg!(
                -m --map <PATH> "Configuration file holding the register map"
            )
            .required(false)
            .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(
                --"map-key" <KEY> "Configuration key of the register map"
            )
            .default_value(DEFAULT_MAP_KEY)
            .value_parser(NonEmptyStringValueParser::new()),
        )
        .arg(
            arg!(
                -i --index <INDEX> "Only forward samples with this index (no register map)"
            )
            .required(false)
            .conflicts_with("map")
            .value_parser(value_parser!(u32)),
        )
        .arg(arg!(
            -d --debug ... "Turn debugging information on"
        ))
        .subcommand(clap::Command::new("check").about("Validate and print the register map"))
        .subcommand(output_args(
            clap::Command::new("listen")
                .about("Receive samples from an outstation feed")
                .arg(
                    arg!(--"host" <HOST> "Outstation address")
                        .default_value(DEFAULT_HOST)
                        .value_parser(NonEmptyStringValueParser::new()),
                )
                .arg(
                    arg!(--"port" <PORT> "Outstation TCP port")
                        .default_value(DEFAULT_PORT.to_string())
                        .value_parser(value_parser!(u16)),
                )
                .arg(
                    arg!(-p --device <TTY> "Read the feed from a serial port instead of TCP")
                        .required(false)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-b --baudrate <BAUDRATE> "Baudrate")
                        .default_value(DEFAULT_BAUDRATE.to_string())
                        .value_parser(value_parser!(u32)),
                ),
        ))
        .subcommand(output_args(
            clap::Command::new("replay")
                .about("Dispatch a recorded feed file")
                .arg(arg!(<file> "Recorded feed, - for stdin").value_parser(value_parser!(PathBuf))),
        ))
        .subcommand_required(true)
        .get_matches();

    let level = match matches.get_count("debug") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = handle_args(&matches).await {
        match e {
            BridgeError::Config(err) => {
                eprintln!("Invalid register map: {}", err);
                exit(2);
            }
            BridgeError::Serial(err) => {
                if err.kind() == tokio_serial::ErrorKind::NoDevice
                    || matches!(err.kind(), tokio_serial::ErrorKind::Io(ErrorKind::NotFound))
                {
                    eprintln!("Serial device not found: {}", err);
                } else {
                    eprintln!("Serial error: {}", err);
                }
                exit(-1);
            }
            BridgeError::Io(err) => {
                if err.kind() == ErrorKind::NotFound {
                    eprintln!("File not found: {}", err);
                } else if err.kind() == ErrorKind::ConnectionRefused {
                    eprintln!("Outstation refused connection: {}", err);
                } else {
                    eprintln!("I/O Error: {}", err);
                }
                exit(-1);
            }
            BridgeError::Sink(err) => {
                eprintln!("Failed to write output: {}", err);
                exit(-1);
            }
            BridgeError::Abort => {
                eprintln!("Feed closed without delivering any data");
                exit(-2);
            }
        }
    }
}

fn load_map(matches: &clap::ArgMatches) -> Result<Option<RegisterMap>> {
    let Some(path) = matches.get_one::<PathBuf>("map") else {
        return Ok(None);
    };
    let key = matches
        .get_one::<String>("map-key")
        .map(String::as_str)
        .unwrap_or(DEFAULT_MAP_KEY);
    let config = std::fs::read_to_string(path)?;
    log::info!("Reading register map from {}", path.display());
    Ok(Some(RegisterMap::parse_with_key(&config, key)?))
}

fn select_policy(matches: &clap::ArgMatches) -> Result<Option<Policy>> {
    if let Some(index) = matches.get_one::<u32>("index") {
        return Ok(Some(Policy::Index(*index)));
    }
    Ok(load_map(matches)?.map(|map| Policy::Map(Arc::new(map))))
}

fn build_sinks(args: &clap::ArgMatches) -> Result<Vec<Box<dyn Sink>>> {
    let format = args
        .get_one::<OutputFormat>("format")
        .unwrap_or(&OutputFormat::Text);

    let output = if let Some(fpath) = args.get_one::<PathBuf>("output") {
        Box::new(BufWriter::new(File::create(fpath)?)) as Box<dyn Write>
    } else {
        Box::new(std::io::stdout()) as Box<dyn Write>
    };

    let primary: Box<dyn Sink> = match format {
        OutputFormat::Text => Box::new(TextSink::new(output)),
        OutputFormat::Json => Box::new(JsonSink::new(output)),
        OutputFormat::Csv => Box::new(CsvSink::new(output)),
    };
    let mut sinks = vec![primary];

    if let Some(fifo) = args.get_one::<PathBuf>("fifo") {
        let file = OpenOptions::new().write(true).open(fifo)?;
        sinks.push(Box::new(FifoSink::new(file)));
    }
    Ok(sinks)
}

async fn handle_args(matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("check", _)) => {
            let Some(map) = load_map(matches)? else {
                eprintln!("No register map given, use --map <PATH>");
                exit(1);
            };
            for entry in &map {
                println!("{}", entry);
            }
            println!("{} points", map.len());
        }
        Some((name @ ("listen" | "replay"), args)) => {
            let Some(policy) = select_policy(matches)? else {
                eprintln!("Either --map <PATH> or --index <INDEX> is required");
                exit(1);
            };
            eprintln!("Forwarding samples by {}", policy);

            let config = SessionConfig {
                log_points: args.get_flag("log-points"),
                ..SessionConfig::default()
            };

            let session = if name == "listen" {
                if let Some(tty) = args.get_one::<PathBuf>("device") {
                    let baudrate = args
                        .get_one::<u32>("baudrate")
                        .unwrap_or(&DEFAULT_BAUDRATE);
                    Session::open_serial(tty.to_string_lossy(), *baudrate, config)?
                } else {
                    let host = args
                        .get_one::<String>("host")
                        .map(String::as_str)
                        .unwrap_or(DEFAULT_HOST);
                    let port = args.get_one::<u16>("port").unwrap_or(&DEFAULT_PORT);
                    Session::connect_tcp(host, *port, config).await?
                }
            } else {
                match args.get_one::<PathBuf>("file") {
                    Some(path) if path.as_os_str() != "-" => {
                        Session::from_reader(tokio::fs::File::open(path).await?, config)
                    }
                    _ => Session::from_reader(tokio::io::stdin(), config),
                }
            };

            let mut dispatcher = Dispatcher::new(policy, build_sinks(args)?);

            let finished = tokio::select! {
                result = session.run(&mut dispatcher) => Some(result),
                _ = tokio::signal::ctrl_c() => None,
            };
            match finished {
                Some(result) => {
                    let summary = result?;
                    eprintln!(
                        "Samples seen: {} ({} emitted, {} points)",
                        summary.samples, summary.emitted, summary.points
                    );
                }
                None => {
                    dispatcher.stop()?;
                    eprintln!("Interrupted, samples seen: {}", dispatcher.samples_seen());
                }
            }
        }
        _ => {
            return Err(std::io::Error::new(
                ErrorKind::Unsupported,
                "Unsupported command line argument",
            )
            .into());
        }
    }

    Ok(())
}
