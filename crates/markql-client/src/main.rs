fn main() -> anyhow::Result<()> {
    markql_client::cli::run()
}
