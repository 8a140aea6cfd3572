use std::path::PathBuf;

use clap::Parser;

/// Command line. Every option except the paths can also come from the config
/// file; flags given here win.
#[derive(Parser, Debug)]
#[command(
    name = "repcast",
    version = env!("GIT_VERSION"),
    about = "DLNA media server that offers every renderer the forms of an item it can actually play",
    arg_required_else_help = true
)]
pub struct Args {
    /// Media directories, scanned recursively
    #[arg(num_args = 1.., value_name = "DIR")]
    pub paths: Vec<PathBuf>,

    /// Listen port [default: 8200]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Name renderers show in their source lists [default: repcast@<hostname>]
    #[arg(short, long)]
    pub name: Option<String>,

    /// TOML config file; without it ./repcast.toml and then
    /// <config dir>/repcast/config.toml are tried
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen on 127.0.0.1 only
    #[arg(long)]
    pub localhost: bool,

    /// Engine processes allowed to run concurrently [default: 4]
    #[arg(long, value_name = "N")]
    pub max_transcodes: Option<usize>,

    /// Minutes between chapter entries, 0 to disable [default: 5]
    #[arg(long, value_name = "MINUTES")]
    pub chapter_interval: Option<u32>,
}
