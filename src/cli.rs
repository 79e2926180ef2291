use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zipserve")]
#[command(version)]
#[command(about = "Serve a directory over HTTP, browsing into zip archives as folders", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipserve ./data                     serve ./data on 0.0.0.0:8080\n  \
  zipserve -l 127.0.0.1:3000 ./data   serve on a different address\n  \
  zipserve -vv ./data                 log every filesystem call")]
pub struct Cli {
    /// Directory to serve
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Address to listen on
    #[arg(short = 'l', long = "listen", value_name = "ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// More logging (-vv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Filter directive implied by `-v`/`-q`, or `None` to defer to
    /// `RUST_LOG` and then the `info` default.
    pub fn log_filter(&self) -> Option<&'static str> {
        match (self.quiet, self.verbose) {
            (true, _) => Some("warn"),
            (false, 0) => None,
            (false, 1) => Some("debug"),
            (false, _) => Some("trace"),
        }
    }
}
