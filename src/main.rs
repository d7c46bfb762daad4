fn main() -> Result<(), Box<dyn std::error::Error>> {
    mdserve::cli::run()
}
