//! Songlab CLI tool.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "songlab")]
#[command(about = "Songlab analysis pipeline CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "SONGLAB_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an audio file or lyrics text for analysis
    Analyze {
        /// Path to the audio file, as visible to the workers
        #[arg(long)]
        file_path: Option<String>,
        /// Input kind: audio or text
        #[arg(long, default_value = "audio")]
        input_type: String,
        /// Known title, if any
        #[arg(long)]
        title: Option<String>,
        /// Known artist, if any
        #[arg(long)]
        artist: Option<String>,
        /// Lyrics text, for text intake
        #[arg(long)]
        lyrics: Option<String>,
        /// Requested outputs: identify, vocals, lyrics, classification
        #[arg(long, value_delimiter = ',', required = true)]
        outputs: Vec<String>,
        /// Poll the job until it finalizes or fails
        #[arg(long)]
        watch: bool,
    },
    /// List jobs, or show one
    Jobs {
        /// Job id
        #[arg(long)]
        id: Option<i64>,
    },
    /// List the song catalog, or show one song
    Songs {
        /// Song id
        #[arg(long)]
        id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            file_path,
            input_type,
            title,
            artist,
            lyrics,
            outputs,
            watch,
        } => {
            commands::analyze::run(
                &cli.api_url,
                file_path,
                &input_type,
                title,
                artist,
                lyrics,
                &outputs,
                watch,
            )
            .await?;
        }
        Commands::Jobs { id } => {
            commands::jobs::run(&cli.api_url, id).await?;
        }
        Commands::Songs { id } => {
            commands::songs::run(&cli.api_url, id).await?;
        }
    }

    Ok(())
}
