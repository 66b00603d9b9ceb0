#![doc = include_str!("../README.md")]
#![warn(clippy::all, clippy::pedantic)]

mod cli;
mod config;
mod evaluate;
mod rules;
mod violations;

use std::process;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = cli::run() {
        eprintln!("{err:?}");
        process::exit(1);
    }
}
