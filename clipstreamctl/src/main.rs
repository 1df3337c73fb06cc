use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = match clipstreamctl::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Usage errors exit 1; --help and --version exit cleanly.
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };
    clipstreamctl::init_tracing(cli.verbose);
    if let Err(err) = clipstreamctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
