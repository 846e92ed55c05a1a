use checkerboard_png::{
    encoder::{CompressionLevel, FilterStrategy},
    Config, RandomBits,
};
use error_stack::{
    fmt::{Charset, ColorMode},
    report, Report, ResultExt,
};
use pico_args::Arguments;
use std::{
    env,
    error::Error,
    ffi::OsString,
    fmt::{Display, Formatter},
    path::PathBuf,
    process::ExitCode,
};
use tracing::Level;
use tracing_error::ErrorLayer;
use tracing_subscriber::{prelude::*, FmtSubscriber};

#[derive(Clone, Copy, Debug, PartialEq)]
struct UsageError;
impl Display for UsageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Invalid command line arguments")
    }
}
impl Error for UsageError {}

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Write {
        output: PathBuf,
        config: Config,
        debug_level: u8,
    },
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [options]

Write a checkerboard image in png format.

Options:
-h | --help                   Print this message
-o | --output-file            Where to put the png file
-p | --png-compression-level  Space vs speed, 0-9, default {level}
-s | --size                   Size of the checkerboard, in squares, default {size}
-r | --random                 Random bits to add to each check, 0-{max_bits}
-i | --increment              Size of each square, in pixels, default {increment}
-D | --debug-level            Amount of debugging output, default 0
     --seed                   Seed for the random bits, default {seed}
     --filter                 Scanline filter, one of {filters:?}, default {filter}
",
        level = CompressionLevel::DEFAULT.get(),
        size = Config::default().board_size,
        max_bits = RandomBits::MAX,
        increment = Config::default().cell_scale,
        seed = Config::default().seed,
        filters = <FilterStrategy as strum::VariantNames>::VARIANTS,
        filter = FilterStrategy::default(),
    )
}

fn parse_args(mut args: Arguments) -> Result<Command, Report<UsageError>> {
    if args.contains(["-h", "--help"]) {
        return Ok(Command::Help);
    }

    let output = args.opt_value_from_str::<_, PathBuf>(["-o", "--output-file"])
        .change_context(UsageError)
        .attach_printable("Invalid value for --output-file")?;
    let compression_level = args.opt_value_from_fn(["-p", "--png-compression-level"], parse_int::parse::<u8>)
        .change_context(UsageError)
        .attach_printable("Invalid value for --png-compression-level")?;
    let board_size = args.opt_value_from_fn(["-s", "--size"], parse_int::parse::<u32>)
        .change_context(UsageError)
        .attach_printable("Invalid value for --size")?;
    let random_bits = args.opt_value_from_fn(["-r", "--random"], parse_int::parse::<u8>)
        .change_context(UsageError)
        .attach_printable("Invalid value for --random")?;
    let cell_scale = args.opt_value_from_fn(["-i", "--increment"], parse_int::parse::<u32>)
        .change_context(UsageError)
        .attach_printable("Invalid value for --increment")?;
    let debug_level = args.opt_value_from_fn(["-D", "--debug-level"], parse_int::parse::<u8>)
        .change_context(UsageError)
        .attach_printable("Invalid value for --debug-level")?;
    let seed = args.opt_value_from_fn("--seed", parse_int::parse::<u64>)
        .change_context(UsageError)
        .attach_printable("Invalid value for --seed")?;
    let filter = args.opt_value_from_str::<_, FilterStrategy>("--filter")
        .change_context(UsageError)
        .attach_printable_lazy(|| format!("Expected one of {:?}", <FilterStrategy as strum::VariantNames>::VARIANTS))?;

    let remaining = args.finish();
    if !remaining.is_empty() {
        return Err(report!(UsageError))
            .attach_printable(format!("Unrecognized arguments: {:?}", remaining.iter().map(OsString::as_os_str).collect::<Vec<_>>()));
    }

    let output = output
        .ok_or(report!(UsageError))
        .attach_printable("The output file must be specified")?;

    let defaults = Config::default();
    let config = Config {
        board_size: board_size.unwrap_or(defaults.board_size),
        cell_scale: cell_scale.unwrap_or(defaults.cell_scale),
        random_bits: match random_bits {
            Some(bits) => RandomBits::new(bits).change_context(UsageError)?,
            None => defaults.random_bits,
        },
        compression_level: match compression_level {
            Some(level) => CompressionLevel::new(level).change_context(UsageError)?,
            None => defaults.compression_level,
        },
        filter: filter.unwrap_or(defaults.filter),
        seed: seed.unwrap_or(defaults.seed),
    };

    Ok(Command::Write {
        output,
        config,
        debug_level: debug_level.unwrap_or(0),
    })
}

/// Picks the log level from `RUST_LOG` if set, otherwise from `--debug-level`
///
/// `None` turns logging off.
fn log_level(rust_log: Result<String, env::VarError>, debug_level: u8) -> Option<Level> {
    match rust_log.map(|env| env.to_lowercase()).as_deref() {
        Ok("error") => Some(Level::ERROR),
        Ok("warn") => Some(Level::WARN),
        Ok("info") => Some(Level::INFO),
        Ok("debug") => Some(Level::DEBUG),
        Ok("trace") => Some(Level::TRACE),
        Ok(_) | Err(env::VarError::NotUnicode(_)) => {
            eprintln!("Ignoring RUST_LOG: expected one of [error, warn, info, debug, trace]");
            None
        },
        Err(env::VarError::NotPresent) => match debug_level {
            0 => None,
            1 => Some(Level::INFO),
            2 => Some(Level::DEBUG),
            _ => Some(Level::TRACE),
        },
    }
}

/// Installs a stderr subscriber; a bad logging setup is reported but never stops the image from being written
fn init_tracing(debug_level: u8) {
    let Some(level) = log_level(env::var("RUST_LOG"), debug_level) else {
        return;
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish()
        .with(ErrorLayer::default());
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Logging disabled, failed to install subscriber: {e}");
    }
}

fn main() -> ExitCode {
    let supports_color = supports_color::on_cached(supports_color::Stream::Stderr)
        .map_or(false, |level| level.has_basic);
    Report::set_color_mode(if supports_color { ColorMode::Color } else { ColorMode::None });

    let supports_unicode = supports_unicode::on(supports_unicode::Stream::Stderr);
    Report::set_charset(if supports_unicode { Charset::Utf8 } else { Charset::Ascii });

    let program = env::args().next().unwrap_or_else(|| "write_checkerboard".into());
    let (output, config, debug_level) = match parse_args(Arguments::from_env()) {
        Ok(Command::Help) => {
            print!("{}", usage(&program));
            return ExitCode::SUCCESS;
        },
        Ok(Command::Write { output, config, debug_level }) => (output, config, debug_level),
        Err(report) => {
            eprintln!("{report:?}");
            eprint!("\n{}", usage(&program));
            return ExitCode::FAILURE;
        },
    };

    init_tracing(debug_level);
    tracing::info!("Writing {config:?} to {}", output.display());

    match checkerboard_png::write_file(&output, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, Report<UsageError>> {
        parse_args(Arguments::from_vec(args.iter().map(OsString::from).collect()))
    }

    #[test]
    fn defaults() {
        let Command::Write { output, config, debug_level } = parse(&["-o", "board.png"]).unwrap() else {
            panic!("expected a write command");
        };
        assert_eq!(output, PathBuf::from("board.png"));
        assert_eq!(config, Config::default());
        assert_eq!(config.compression_level.get(), 6);
        assert_eq!(debug_level, 0);
    }

    #[test]
    fn every_option() {
        let cmd = parse(&[
            "--output-file", "out.png",
            "-p", "9",
            "--size", "0x10",
            "-r", "3",
            "-i", "4",
            "-D", "2",
            "--seed", "77",
            "--filter", "paeth",
        ]).unwrap();
        let expected = Config {
            board_size: 16,
            cell_scale: 4,
            random_bits: RandomBits::new(3).unwrap(),
            compression_level: CompressionLevel::BEST,
            filter: FilterStrategy::Paeth,
            seed: 77,
        };
        assert_eq!(cmd, Command::Write {
            output: "out.png".into(),
            config: expected,
            debug_level: 2,
        });
    }

    #[test]
    fn help() {
        assert_eq!(parse(&["--help", "-o", "ignored.png"]).unwrap(), Command::Help);
        assert!(usage("write_checkerboard").contains("default 6"));
    }

    #[test]
    fn missing_output_file() {
        let err = parse(&["-s", "8"]).unwrap_err();
        assert_eq!(err.current_context(), &UsageError);
        assert!(format!("{err:?}").contains("The output file must be specified"));
    }

    #[test]
    fn out_of_range_values() {
        for args in [
            &["-o", "x.png", "-r", "9"][..],
            &["-o", "x.png", "-p", "10"],
            &["-o", "x.png", "--filter", "median"],
            &["-o", "x.png", "-s", "lots"],
        ] {
            assert!(parse(args).is_err(), "{args:?}");
        }
    }

    #[test]
    fn log_levels() {
        assert_eq!(log_level(Ok("DEBUG".into()), 0), Some(Level::DEBUG));
        assert_eq!(log_level(Ok("warn".into()), 3), Some(Level::WARN));
        assert_eq!(log_level(Ok("loud".into()), 3), None);
        assert_eq!(log_level(Err(env::VarError::NotPresent), 0), None);
        assert_eq!(log_level(Err(env::VarError::NotPresent), 1), Some(Level::INFO));
        assert_eq!(log_level(Err(env::VarError::NotPresent), 2), Some(Level::DEBUG));
        assert_eq!(log_level(Err(env::VarError::NotPresent), 7), Some(Level::TRACE));
    }

    #[test]
    fn unknown_argument() {
        let err = parse(&["-o", "x.png", "--colour", "blue"]).unwrap_err();
        assert_eq!(err.current_context(), &UsageError);
    }
}
