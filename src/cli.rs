use std::path::PathBuf;

use clap::Parser;

use s3browse::utils::version;

#[derive(Parser, Debug)]
#[command(author, version = version(), about)]
pub struct Cli {
    /// Settings file to load instead of the default config location
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bucket to browse, overriding the settings file
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Key prefix to list under
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// List the whole bucket flat instead of folder by folder
    #[arg(long)]
    pub flat: bool,
}
