use sigil_cli::input::Input;
use sigil_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("SIGIL_LOG", "error,sigil=info"))
        .init();

    let matches = sigil_cli::command().get_matches();

    let input = Input::from_arguments(matches)?;
    let runner = input.build().map(Runner::new)?;
    runner.run()?;

    Ok(())
}
