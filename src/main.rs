fn main() -> anyhow::Result<()> {
    stats_explorer_lib::run()
}
