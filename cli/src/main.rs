mod http_gateway;

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use communitree_core::identity::generate_user_id;
use communitree_core::ornament::{Fingerprint, CLEANUP_MINUTES};
use communitree_core::{
    dedupe_ornaments, Board, BoardServices, Manipulation, OrnamentGateway,
    PollOutcome, PollTrigger, SaveOutcome, SurfacePoint, SurfaceSize, UserId,
    MAX_ORNAMENTS_PER_USER, POLL_INTERVAL_MS,
};
use image_pipeline::{
    compress_for_storage, is_image_mime, normalize_upload, NormalizeConfig, StorageConfig,
};
use rand::Rng;

use crate::http_gateway::HttpGateway;

#[derive(Parser)]
#[command(name = "communitree-cli", version, about = "Inspection tools for the community tree")]
struct Cli {
    #[arg(long, env = "COMMUNITREE_BASE_URL", default_value = "http://localhost:8787", global = true)]
    base_url: String,
    #[arg(long, env = "COMMUNITREE_USER_ID", global = true)]
    user_id: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Ornaments {
        #[command(subcommand)]
        command: OrnamentCommand,
    },
    Image {
        #[command(subcommand)]
        command: ImageCommand,
    },
}

#[derive(Subcommand)]
enum OrnamentCommand {
    /// Print the shared list, duplicates collapsed.
    List {
        #[arg(long)]
        mine: bool,
        #[arg(long)]
        json: bool,
    },
    /// Place an image the way the tree page does and save it.
    Add {
        image: PathBuf,
        #[arg(long)]
        x: f64,
        #[arg(long)]
        y: f64,
        #[arg(long)]
        size: Option<f64>,
        #[arg(long, default_value_t = 0.0)]
        rotate: f64,
        #[arg(long, default_value_t = 600.0)]
        surface_width: f64,
        #[arg(long, default_value_t = 800.0)]
        surface_height: f64,
    },
    Delete {
        fingerprint: String,
    },
    /// Poll like an open tree page and report every change.
    Watch {
        #[arg(long, default_value_t = POLL_INTERVAL_MS)]
        interval_ms: u32,
        #[arg(long)]
        cycles: Option<u32>,
    },
}

#[derive(Subcommand)]
enum ImageCommand {
    Normalize {
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also apply the pre-save storage compression.
        #[arg(long)]
        storage: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let user_id = match cli.user_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => UserId::from_raw(raw),
        _ => {
            let mut rng = rand::rng();
            generate_user_id(now_ms(), || rng.random::<f64>())
        }
    };

    match cli.command {
        Commands::Ornaments { command } => {
            let board = Board::new(HttpGateway::new(cli.base_url), user_id, board_services());
            run_ornaments(&board, command).await?;
        }
        Commands::Image { command } => match command {
            ImageCommand::Normalize {
                input,
                output,
                storage,
            } => normalize_file(&input, output.as_deref(), storage)?,
        },
    }
    Ok(())
}

async fn run_ornaments<G: OrnamentGateway>(
    board: &Board<G>,
    command: OrnamentCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        OrnamentCommand::List { mine, json } => {
            let list = dedupe_ornaments(board.gateway().list().await?);
            let user_id = board.user_id();
            let list: Vec<_> = list
                .into_iter()
                .filter(|ornament| !mine || ornament.belongs_to(user_id.as_str()))
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
                return Ok(());
            }
            for ornament in &list {
                println!(
                    "{}\t{},{}\t{}x{}\t{}\t{}",
                    ornament.user_id,
                    ornament.x,
                    ornament.y,
                    ornament.width,
                    ornament.height,
                    ornament.timestamp,
                    ornament.fingerprint()
                );
            }
            eprintln!(
                "{} ornaments (entries expire after {CLEANUP_MINUTES} minutes)",
                list.len()
            );
        }
        OrnamentCommand::Add {
            image,
            x,
            y,
            size,
            rotate,
            surface_width,
            surface_height,
        } => {
            let mime = mime_for_path(&image);
            if !is_image_mime(mime) {
                return Err(format!("{} is not an image", image.display()).into());
            }
            let bytes = std::fs::read(&image)?;

            if let PollOutcome::Failed(err) = board.refresh(PollTrigger::Mount).await {
                return Err(err.into());
            }
            board.ensure_below_limit()?;
            let normalized = normalize_upload(&bytes, mime, &NormalizeConfig::default());
            eprintln!("normalized upload: {:?}", normalized.strategy);
            board.begin_placing(normalized.data_url)?;
            let surface = SurfaceSize {
                width: surface_width,
                height: surface_height,
            };
            if !board.place_at(SurfacePoint { x, y }, surface)? {
                board.cancel();
                return Err(format!("({x}, {y}) is outside the {surface_width}x{surface_height} tree").into());
            }
            if let Some(size) = size {
                board.manipulate(Manipulation::Resize {
                    width: size,
                    height: size,
                })?;
            }
            if rotate != 0.0 {
                board.manipulate(Manipulation::Rotate { delta_deg: rotate })?;
            }
            match board.save().await {
                SaveOutcome::Saved { user_count } => {
                    println!("saved ({user_count}/{MAX_ORNAMENTS_PER_USER}) as {}", board.user_id());
                }
                SaveOutcome::Failed(err) => return Err(err.into()),
                SaveOutcome::Refused(err) => return Err(err.into()),
            }
        }
        OrnamentCommand::Delete { fingerprint } => {
            board
                .gateway()
                .remove(&Fingerprint::from_raw(fingerprint.clone()))
                .await?;
            println!("deleted {fingerprint}");
        }
        OrnamentCommand::Watch {
            interval_ms,
            cycles,
        } => {
            report(board, board.refresh(PollTrigger::Mount).await);
            let mut ticker = tokio::time::interval(Duration::from_millis(u64::from(interval_ms)));
            ticker.tick().await;
            let mut remaining = cycles;
            while remaining != Some(0) {
                ticker.tick().await;
                report(board, board.refresh(PollTrigger::Timer).await);
                remaining = remaining.map(|left| left - 1);
            }
        }
    }
    Ok(())
}

fn report<G: OrnamentGateway>(board: &Board<G>, outcome: PollOutcome) {
    let snapshot = board.snapshot();
    match outcome {
        PollOutcome::Changed(stats) => println!(
            "changed: {} ornaments ({} yours), {} replaced, {} rendered, {} duplicates",
            snapshot.total, snapshot.own_count, stats.removed, stats.inserted, stats.skipped
        ),
        PollOutcome::Unchanged => println!("unchanged: {} ornaments", snapshot.total),
        PollOutcome::NoList => eprintln!("response carried no ornament list"),
        PollOutcome::Skipped => {}
        PollOutcome::Failed(err) => eprintln!("poll failed: {err}"),
    }
}

fn normalize_file(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    storage: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mime = mime_for_path(input);
    let bytes = std::fs::read(input)?;
    let normalized = normalize_upload(&bytes, mime, &NormalizeConfig::default());
    println!(
        "upload: {:?}, {} bytes -> {} chars",
        normalized.strategy,
        bytes.len(),
        normalized.data_url.len()
    );
    let mut data_url = normalized.data_url;
    if storage {
        let payload = compress_for_storage(&data_url, &StorageConfig::default());
        println!("storage: {:?}, {} chars", payload.strategy, payload.data_url.len());
        data_url = payload.data_url;
    }
    if let Some(output) = output {
        std::fs::write(output, data_url)?;
    }
    Ok(())
}

fn board_services() -> BoardServices {
    BoardServices::new(
        Rc::new(now_ms),
        Rc::new(|src: &str| compress_for_storage(src, &StorageConfig::default()).data_url),
    )
}

fn mime_for_path(path: &std::path::Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
