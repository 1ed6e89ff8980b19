use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "musicalterm", version)]
#[command(about = "Terminal music player for YouTube and YouTube Music links")]
pub struct Cli {
  /// Video or playlist URL. Prompted for when omitted.
  pub url: Option<String>,

  /// Override config file path.
  #[arg(long)]
  pub config: Option<PathBuf>,

  /// Override log file path.
  #[arg(long)]
  pub log_file: Option<PathBuf>,

  /// Start with shuffle enabled.
  #[arg(long)]
  pub shuffle: bool,

  /// Start with repeat enabled.
  #[arg(long)]
  pub repeat: bool,

  /// Initial volume (0-100), overriding the config.
  #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
  pub volume: Option<u8>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_flags() {
    let cli = Cli::try_parse_from([
      "musicalterm",
      "https://youtu.be/abc",
      "--shuffle",
      "--volume",
      "40",
    ])
    .unwrap();
    assert_eq!(cli.url.as_deref(), Some("https://youtu.be/abc"));
    assert!(cli.shuffle);
    assert!(!cli.repeat);
    assert_eq!(cli.volume, Some(40));
  }

  #[test]
  fn test_volume_out_of_range_is_rejected() {
    assert!(Cli::try_parse_from(["musicalterm", "--volume", "150"]).is_err());
  }
}
