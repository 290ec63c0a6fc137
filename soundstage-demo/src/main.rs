mod cli;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mock = args.iter().skip(1).any(|arg| arg == "--mock");

    cli::run(mock)
}
