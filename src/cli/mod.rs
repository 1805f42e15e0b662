//! CLI interface using clap
//!
//! Provides the command-line interface for StorePulse

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand};

/// StorePulse - App Store review intelligence tool
#[derive(Parser, Debug)]
#[command(name = "storepulse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the SQLite database (defaults to the user data directory)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = "storepulse.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate reviews for a keyword and synthesize a competitive analysis
    Analyze(AnalyzeArgs),

    /// Analyze screenshots of the top apps for a keyword
    Screenshots(ScreenshotsArgs),

    /// Generate ASO recommendations for one app against its competitors
    Aso(AsoArgs),

    /// Extract keyword intelligence from competitor metadata
    Keywords(KeywordsArgs),

    /// Show past analyses for a keyword
    History(HistoryArgs),

    /// Show details of a specific analysis
    Show(ShowArgs),

    /// List cached apps for a keyword
    Apps(AppsArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Search keyword to analyze
    pub keyword: String,

    /// Number of top apps to analyze
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// App Store country code (defaults to configuration)
    #[arg(short, long)]
    pub country: Option<String>,

    /// Model to use (defaults to configuration)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Force fresh fetch of apps, reviews, and analysis
    #[arg(short, long)]
    pub force: bool,

    /// Analyze only low-rating reviews (pattern/opportunity report)
    #[arg(long)]
    pub low_only: bool,
}

/// Arguments for screenshots command
#[derive(Parser, Debug)]
pub struct ScreenshotsArgs {
    /// Search keyword whose top apps to analyze
    pub keyword: String,

    /// Number of top apps to analyze
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// App Store country code (defaults to configuration)
    #[arg(short, long)]
    pub country: Option<String>,

    /// Force fresh analysis even if cached
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for aso command
#[derive(Parser, Debug)]
pub struct AsoArgs {
    /// Search keyword the competitors rank for
    pub keyword: String,

    /// Catalog id of the app to optimize (must be cached for the keyword)
    pub app_id: String,

    /// Force fresh analysis even if cached
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for keywords command
#[derive(Parser, Debug)]
pub struct KeywordsArgs {
    /// Search keyword whose competitors to mine
    pub keyword: String,
}

/// Arguments for history command
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Keyword to list analyses for
    pub keyword: String,
}

/// Arguments for show command
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Analysis id
    pub id: i64,
}

/// Arguments for apps command
#[derive(Parser, Debug)]
pub struct AppsArgs {
    /// Keyword to list cached apps for
    pub keyword: String,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["storepulse", "analyze", "meditation", "--limit", "5"]);
        assert!(matches!(cli.command, Commands::Analyze(_)));

        if let Commands::Analyze(args) = cli.command {
            assert_eq!(args.keyword, "meditation");
            assert_eq!(args.limit, 5);
            assert!(!args.force);
        }
    }

    #[test]
    fn test_aso_command() {
        let cli = Cli::parse_from(["storepulse", "aso", "meditation", "12345", "--force"]);
        if let Commands::Aso(args) = cli.command {
            assert_eq!(args.keyword, "meditation");
            assert_eq!(args.app_id, "12345");
            assert!(args.force);
        } else {
            panic!("expected aso command");
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["storepulse", "--db", "other.db", "history", "meditation"]);
        assert_eq!(cli.db.as_deref(), Some("other.db"));
        assert_eq!(cli.format, OutputFormat::Text);
    }
}
