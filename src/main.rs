mod app;
mod cli;
mod console;
mod tui;

use clap::Parser;

fn main() {
    let cli = cli::Cli::parse();
    app::init_tracing(cli.verbose, app::uses_terminal_view(&cli));

    if let Err(err) = app::execute(cli) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
