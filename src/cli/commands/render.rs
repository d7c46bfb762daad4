//! Render command implementation.

use std::sync::Arc;

use crate::cli::args::CommonArgs;
use crate::render::Renderer;

pub fn run(args: CommonArgs, file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.load_config()?;
    let renderer = Renderer::new(Arc::new(config));
    let html = renderer.render_file(file)?;
    println!("{html}");
    Ok(())
}
