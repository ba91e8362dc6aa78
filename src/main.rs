fn main() -> anyhow::Result<()> {
    smartsynch_lib::run()
}
