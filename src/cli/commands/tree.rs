//! Tree command implementation.

use std::sync::Arc;

use crate::cli::args::CommonArgs;
use crate::scanner::Scanner;

pub fn run(args: CommonArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.load_config()?;
    let scanner = Scanner::new(Arc::new(config));
    let tree = scanner.scan();
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}
