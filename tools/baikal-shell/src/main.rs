//! Baikal board maintenance shell.
//!
//! Host rendition of the UEFI Shell tools shipped with the Baikal firmware:
//! `ddr-settings`, `spi-flash` and `spi-flash-image`. Flash access goes
//! through the same secure-monitor client the firmware uses, answered by an
//! emulated monitor backed by an image file.
//!
//! Exit codes follow the firmware tools: 0 on success, otherwise the low
//! byte of the UEFI status (2 for an invalid parameter, 7 for a device
//! error). Failures without a status, such as unreadable files, exit 1.

mod cli;
mod config;
mod ddr_settings;
mod session;
mod spi_flash;
mod spi_flash_image;
mod status;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};
use crate::config::BoardConfig;
use crate::session::Session;

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        log::LevelFilter::Error
    } else if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = BoardConfig::load(cli.config.as_deref())?;
    let mut session = Session::open(&cli.image, &config)?;
    let map = *session.map();

    match &cli.command {
        Command::DdrSettings(args) => {
            ddr_settings::run(session.flash(), &map.ddr_settings, args).map(drop)
        }
        Command::SpiFlash(args) => spi_flash::run(session.flash(), &map, &args.command),
        Command::SpiFlashImage(args) => spi_flash_image::run(session.flash(), &map, args),
    }?;

    session.persist()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            match status::status_of(&err) {
                Some(status) => {
                    log::debug!("exiting with {status}");
                    ExitCode::from(status::exit_code(status))
                }
                None => ExitCode::FAILURE,
            }
        }
    }
}
