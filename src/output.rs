//! Terminal feedback for the `serve` command.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn finish_spinner_success(spinner: &ProgressBar, msg: &str) {
    spinner.finish_with_message(format!("{} {}", style("✓").green().bold(), msg));
}

pub fn finish_spinner_error(spinner: &ProgressBar, msg: &str) {
    spinner.finish_with_message(format!("{} {}", style("✗").red().bold(), msg));
}

/// Where clients reach the share, and how to stop it.
pub fn print_share_ready(url: &str) {
    println!();
    println!("  {} {}", style("Share URL:").bold(), style(url).cyan().underlined());
    println!(
        "  {}",
        style("Anyone with this URL can call /api/setup and re-point the share.").yellow()
    );
    println!("  {}", style("Press Ctrl+C to stop sharing.").dim());
    println!();
}

/// Shown when the server waits for a client to call the setup endpoint.
pub fn print_awaiting_setup(local_url: &str) {
    println!();
    println!(
        "  {} POST {}/api/setup",
        style("Waiting for setup:").bold(),
        style(local_url).cyan()
    );
    println!("  {}", style("Press Ctrl+C to stop.").dim());
    println!();
}
