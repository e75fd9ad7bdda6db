fn main() -> anyhow::Result<()> {
    food_gallery::cli::run()
}
