use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use chrono::Local;
use color_eyre::Result;
use crossterm::style::Stylize;
use log::LevelFilter;
use pager::Pager;

use seffreport::args::Args;
use seffreport::report::{report, SelectionError};

fn init_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .init();
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let args: Args = argh::from_env();
    if args.version {
        println!("seffreport v{}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    init_logger(args.debug);

    let color = args
        .color_choice()
        .unwrap_or_else(|| std::io::stdout().is_terminal());

    match report(&args, color) {
        Ok(report) => {
            if report.needs_pager(std::io::stdout().is_terminal()) {
                Pager::with_default_pager("less -R").setup();
            }

            println!("{}", report.output);
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => match error.downcast_ref::<SelectionError>() {
            Some(error) => {
                eprintln!("{}", error.to_string().red());
                Ok(ExitCode::FAILURE)
            }
            None => Err(error),
        },
    }
}
