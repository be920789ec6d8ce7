use clap::Parser;

fn main() {
    let cli = pixgrabctl::Cli::parse();
    if let Err(err) = pixgrabctl::run(cli) {
        eprintln!("erro: {err}");
        std::process::exit(1);
    }
}
