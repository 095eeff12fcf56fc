use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kinmatch::{
    config, ChildRecord, EmbeddingDatabase, EmbeddingExtractor, MatchingService, OnnxExtractor,
};
use log::{info, warn};
use serde::Serialize;

const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
const MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "kinmatch")]
#[command(
    version,
    about = "Predict which children resemble a pair of parents from face embeddings"
)]
struct Cli {
    /// Config file (defaults to the compiled-in location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the mixing weight that best explains a child photo
    Alpha {
        #[arg(long)]
        mother: PathBuf,
        #[arg(long)]
        father: PathBuf,
        /// Child photo to calibrate against (falls back to the configured policy)
        #[arg(long)]
        child: Option<PathBuf>,
    },
    /// Rank database children by resemblance to the blended parents
    Match {
        #[arg(long)]
        mother: PathBuf,
        #[arg(long)]
        father: PathBuf,
        #[arg(long)]
        child: Option<PathBuf>,
        /// Fixed alpha instead of searching for one
        #[arg(long)]
        alpha: Option<f32>,
        /// Embedding database (defaults to the configured one)
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Build an embedding database from a directory of child photos
    Build {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Open config file in editor
    Config,
}

#[derive(Serialize)]
struct MatchResponse {
    alpha: f32,
    results: Vec<kinmatch::MatchResult>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Alpha {
            mother,
            father,
            child,
        } => alpha(&cfg, &mother, &father, child.as_deref()),
        Commands::Match {
            mother,
            father,
            child,
            alpha,
            db,
            top_k,
        } => {
            let db = db.unwrap_or_else(|| cfg.database_path.clone());
            let top_k = top_k.unwrap_or(cfg.top_k);
            run_match(&cfg, &mother, &father, child.as_deref(), alpha, &db, top_k)
        }
        Commands::Build { dir, out } => build(&cfg, &dir, &out),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn service(cfg: &config::Config) -> Result<MatchingService<OnnxExtractor>> {
    let extractor = OnnxExtractor::new(&cfg.model_path, cfg.min_face_size)
        .context("Failed to initialize face embedding model")?;
    Ok(MatchingService::new(extractor, cfg.settings())?)
}

fn alpha(cfg: &config::Config, mother: &Path, father: &Path, child: Option<&Path>) -> Result<()> {
    check_image(mother)?;
    check_image(father)?;
    if let Some(child) = child.filter(|p| p.exists()) {
        check_image(child)?;
    }

    let estimate = service(cfg)?
        .find_best_alpha(mother, father, child)
        .context("Failed to estimate alpha")?;
    match estimate.distance {
        Some(d) => info!("Best alpha {:.2} (distance {:.4})", estimate.alpha, d),
        None => info!("No child photo, using default alpha {:.2}", estimate.alpha),
    }
    println!("{:.2}", estimate.alpha);
    Ok(())
}

fn run_match(
    cfg: &config::Config,
    mother: &Path,
    father: &Path,
    child: Option<&Path>,
    alpha: Option<f32>,
    db: &Path,
    top_k: usize,
) -> Result<()> {
    check_image(mother)?;
    check_image(father)?;
    if let Some(child) = child.filter(|p| p.exists()) {
        check_image(child)?;
    }

    let service = service(cfg)?;
    let (alpha, results) = match alpha {
        Some(alpha) => {
            let results = service
                .find_similar_children(mother, father, alpha, db, top_k)
                .context("Error processing images")?;
            (alpha, results)
        }
        None => {
            let family = service
                .match_family(mother, father, child, db, top_k)
                .context("Error processing images")?;
            (family.alpha.alpha, family.results)
        }
    };
    info!("Ranked {} child(ren) at alpha {:.2}", results.len(), alpha);

    let response = MatchResponse {
        alpha: (alpha * 100.0).round() / 100.0,
        results,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn build(cfg: &config::Config, dir: &Path, out: &Path) -> Result<()> {
    info!("Building database from {}", dir.display());
    let extractor = OnnxExtractor::new(&cfg.model_path, cfg.min_face_size)
        .context("Failed to initialize face embedding model")?;

    let mut photos: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_allowed_extension(p))
        .collect();
    photos.sort();

    let mut records = Vec::with_capacity(photos.len());
    for photo in &photos {
        let (Some(id), Some(image)) = (
            photo.file_stem().and_then(|s| s.to_str()),
            photo.file_name().and_then(|s| s.to_str()),
        ) else {
            warn!("Skipping {}: non UTF-8 file name", photo.display());
            continue;
        };
        match extractor.extract(photo) {
            Ok(embedding) => records.push(ChildRecord {
                id: id.to_string(),
                image: image.to_string(),
                embedding,
            }),
            Err(e) => warn!("Skipping {}: {}", photo.display(), e),
        }
    }

    let db = EmbeddingDatabase::new(records).context("Failed to assemble database")?;
    db.save(out).context("Failed to save database")?;
    info!("✓ Saved {} child(ren) to {}", db.len(), out.display());
    Ok(())
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| e.eq_ignore_ascii_case(allowed))
        })
}

fn check_image(path: &Path) -> Result<()> {
    if !has_allowed_extension(path) {
        anyhow::bail!(
            "{}: allowed file types are png, jpg, jpeg",
            path.display()
        );
    }
    let size = std::fs::metadata(path)
        .with_context(|| format!("reading {}", path.display()))?
        .len();
    if size > MAX_IMAGE_BYTES {
        anyhow::bail!("{}: image exceeds 16MB", path.display());
    }
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH).as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_checks_child_photo_type() {
        let dir = tempfile::tempdir().unwrap();
        let photo = |name: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, b"stand-in").unwrap();
            path
        };
        let (mother, father, child) = (photo("mom.png"), photo("dad.jpg"), photo("kid.gif"));
        let cfg = config::Config::default();

        // rejected before the model is ever loaded
        let err = run_match(
            &cfg,
            &mother,
            &father,
            Some(&child),
            None,
            &dir.path().join("children.bin"),
            5,
        )
        .unwrap_err();
        assert!(err.to_string().contains("allowed file types"), "{err}");
    }
}
