/// CLI for the askpanel coordinator
fn main() -> anyhow::Result<()> {
    askpanel_core::cli_app::run(std::env::args().collect())
}
