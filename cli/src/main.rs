//! dat CLI: run loadable functions and specs from the command line.
//!
//! # Usage
//!
//! ```text
//! dat dt.list hello
//! dat my_letters --set main.title "Re-configured letterator"
//! dat my_letters --sets main.title=QuickChart,start=100,end=110
//! dat --info
//! ```

use std::process;

use dat_core::cli::run_argv;
use dat_core::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;


fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let cwd = match std::env::current_dir() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("dat: cannot read current directory: {}", e);
            process::exit(1);
        }
    };

    let mut ctx = match Context::discover(&cwd) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("dat: {}", e);
            process::exit(1);
        }
    };

    if args.first().map(|a| a == "--info").unwrap_or(false) {
        match ctx.config() {
            Some(config) => print!("{}", config),
            None => println!("no configuration"),
        }
        return;
    }

    match run_argv(&mut ctx, &args) {
        Ok(Some(output)) => println!("{}", output),
        Ok(None) => {}
        Err(e) => {
            eprintln!("dat: {}", e);
            process::exit(1);
        }
    }
}


/// Log to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
