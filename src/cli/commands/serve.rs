//! Serve command implementation.

use crate::cli::args::ServeArgs;

pub fn run(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = args.common.load_config()?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(crate::serve::serve(config, args.watch))
}
