use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "diffwatch",
    version,
    about = "Watch files below a root directory and print line diffs on change"
)]
pub struct Args {
    /// Root directory below which all watched files must live
    pub root: PathBuf,

    /// Files to watch (absolute, or relative to the working directory)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory for shadow copies (default: a fresh directory under the
    /// system temp dir; deleted on shutdown)
    #[arg(long = "shadow-dir")]
    pub shadow_dir: Option<PathBuf>,
}
