//! Photo editor CLI tool
//!
//! Command-line interface for the photo-editor pipeline: background removal,
//! lighting enhancement, clothing replacement and background synthesis.

#[cfg(feature = "cli")]
use photo_editor::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(2);
}
