//! Trellis Viewer
//!
//! Renders a grid of spinning, textured cubes through the frame loop.
//! Resize or minimize the window to exercise swapchain recreation.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p trellis-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--vsync`: Present with FIFO instead of MAILBOX
//! - `--no-validation`: Disable Vulkan validation layers
//! - `--cubes <N>`: Number of cubes to draw (default: 9)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use trellis_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const DEFAULT_CUBES: u32 = 9;

/// Command line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub vsync: bool,
    pub validation: bool,
    pub cubes: u32,
    pub help: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            vsync: false,
            validation: cfg!(debug_assertions),
            cubes: DEFAULT_CUBES,
            help: false,
        }
    }
}

impl Options {
    /// Parse options from the process arguments.
    pub fn from_env() -> Result<Self, String> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse options, not including the program name.
    pub fn parse<I, S>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_ref() {
                "--vsync" => options.vsync = true,
                "--no-validation" => options.validation = false,
                "--cubes" => {
                    let value = args
                        .next()
                        .ok_or_else(|| "--cubes needs a value".to_string())?;
                    options.cubes = value
                        .as_ref()
                        .parse()
                        .map_err(|e| format!("Invalid cube count {:?}: {e}", value.as_ref()))?;
                }
                "-h" | "--help" => options.help = true,
                other => return Err(format!("Unknown option: {other}")),
            }
        }

        Ok(options)
    }
}

fn main() -> anyhow::Result<()> {
    let options = match Options::from_env() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}\n");
            print_help();
            std::process::exit(2);
        }
    };

    if options.help {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(
        AppConfig::new("Trellis Viewer")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(options.vsync)
            .with_validation(options.validation),
    )
}

fn print_help() {
    eprintln!(
        "Trellis Viewer

USAGE:
    cargo run -p trellis-viewer -- [OPTIONS]

OPTIONS:
    --vsync             Present with FIFO instead of MAILBOX
    --no-validation     Disable Vulkan validation layers
    --cubes <N>         Number of cubes to draw (default: {DEFAULT_CUBES})
    -h, --help          Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG            Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = Options::parse(Vec::<String>::new()).unwrap();
        assert_eq!(options, Options::default());
        assert_eq!(options.cubes, DEFAULT_CUBES);
    }

    #[test]
    fn flags() {
        let options = Options::parse(["--vsync", "--no-validation", "--cubes", "4"]).unwrap();
        assert!(options.vsync);
        assert!(!options.validation);
        assert_eq!(options.cubes, 4);
        assert!(!options.help);
    }

    #[test]
    fn help() {
        assert!(Options::parse(["-h"]).unwrap().help);
        assert!(Options::parse(["--help"]).unwrap().help);
    }

    #[test]
    fn errors() {
        assert!(Options::parse(["--cubes"]).is_err());
        assert!(Options::parse(["--cubes", "many"]).is_err());
        assert!(Options::parse(["--fullscreen"]).is_err());
    }
}
