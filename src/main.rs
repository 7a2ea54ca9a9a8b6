mod app;
mod cli;

use clap::Parser;

use crate::cli::Cli;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = app::run(&cli) {
        log::error!("{err}");
        for cause in err.chain().skip(1) {
            log::error!("caused by: {cause}");
        }
        std::process::exit(1);
    }
}
