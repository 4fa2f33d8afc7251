fn main() -> anyhow::Result<()> {
    rowvault_cli::run()
}
