use chrono::{DateTime, Local};
use clap::Parser;
use diffwatch::cli::Args;
use diffwatch::event::{ModificationEvent, Observer};
use diffwatch::notifier::Notifier;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let root = absolutize(&args.root);
    if !root.is_dir() {
        eprintln!("diffwatch: {}: not a directory", root.display());
        process::exit(1);
    }
    let shadow_root = args
        .shadow_dir
        .as_deref()
        .map(absolutize)
        .unwrap_or_else(|| std::env::temp_dir().join(format!("diffwatch-{}", process::id())));

    let notifier = Arc::new(Notifier::new(&root, &shadow_root).unwrap_or_else(|e| {
        eprintln!("diffwatch: failed to create notifier: {e}");
        process::exit(1);
    }));
    println!("Root   : {}", root.display());
    println!("Shadow : {}", shadow_root.display());

    // ModificationEvent's Display renders the path plus the diff block, so
    // only the timestamp needs formatting here.
    let observer: Arc<dyn Observer> = Arc::new(|event: &ModificationEvent| {
        let stamp: DateTime<Local> = event.file_time().into();
        println!("{}: {}", stamp.format("%Y-%m-%d %H:%M:%S %Z"), event);
    });

    for file in &args.files {
        let file = absolutize(file);
        println!("Watched: {}", file.display());
        if let Err(e) = notifier.add_observer(&file, Arc::clone(&observer)) {
            eprintln!("diffwatch: failed to watch {}: {e}", file.display());
        }
    }

    // Clean up watches and the shadow tree on Ctrl-C.
    let stopper = Arc::clone(&notifier);
    ctrlc::set_handler(move || {
        println!("Shutdown.");
        if let Err(e) = stopper.stop() {
            eprintln!("diffwatch: shutdown failed: {e}");
        }
        process::exit(0);
    })
    .unwrap_or_else(|e| {
        eprintln!("diffwatch: failed to install shutdown handler: {e}");
        process::exit(1);
    });

    loop {
        std::thread::park();
    }
}

/// Interpret relative paths against the working directory, like any other
/// command-line tool.
fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
