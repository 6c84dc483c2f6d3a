use clap::Parser;

mod cli;

fn main() {
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    if let Err(e) = cli::run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
