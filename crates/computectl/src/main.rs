use anyhow::Result;
use clap::Parser;
use log::error;

use commands::{ComputeCmd, GlobalOpts};

mod commands;
mod config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(subcommand)]
    subcmd: ComputeCmd,
}

fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let opts = Opts::parse();
    let global = &opts.global;
    let cmd_result = match opts.subcmd {
        ComputeCmd::Create(create) => commands::create::create(create, global),
        ComputeCmd::Start(start) => commands::start::start(start, global),
        ComputeCmd::Stop(stop) => commands::stop::stop(stop, global),
        ComputeCmd::Suspend(suspend) => commands::suspend::suspend(suspend, global),
        ComputeCmd::Restart(restart) => commands::restart::restart(restart, global),
        ComputeCmd::Delete(delete) => commands::delete::delete(delete, global),
        ComputeCmd::Uri(uri) => commands::uri::uri(uri, global),
    };

    if let Err(ref e) = cmd_result {
        error!("error in executing command: {:?}", e);
    }

    cmd_result
}
