//! Manifest listing, game details and cache maintenance.

use std::path::Path;

use gogrepo_metadata::{MetadataKind, Source};
use tracing::warn;

use crate::cli::CacheAction;
use crate::state::HubState;

pub fn list(state: &HubState, json: bool) -> anyhow::Result<()> {
    let games = state.metadata.manifest().games();
    if json {
        println!("{}", serde_json::to_string_pretty(&games)?);
        return Ok(());
    }
    if games.is_empty() {
        eprintln!(
            "no games found in {} (run `update` first)",
            state.config.manifest_path().display()
        );
    }
    for game in &games {
        println!(
            "{:<40} {:>10}  {}",
            game.title,
            game.product_id.as_deref().unwrap_or("-"),
            game.long_title
        );
    }
    Ok(())
}

pub async fn info(
    state: &HubState,
    game: &str,
    cover_out: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let info = state.metadata.info(game).await;

    if let Some(path) = cover_out {
        if info.has_cover() {
            std::fs::write(path, &info.cover)?;
            eprintln!("cover written to {}", path.display());
        } else {
            warn!(game, "no cover available");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", info.title);
    println!();
    match info.description_source {
        Some(source) => {
            println!("description ({}):", source_label(source));
            println!("{}", info.description_html);
        }
        None => println!("description: none"),
    }
    match info.cover_source {
        Some(source) => println!(
            "cover: {} bytes, {} ({})",
            info.cover.len(),
            info.cover_content_type,
            source_label(source)
        ),
        None => println!("cover: none"),
    }
    Ok(())
}

pub fn cache(state: &HubState, action: CacheAction) -> anyhow::Result<()> {
    match action {
        CacheAction::Size => println!("{}", state.metadata.cache_size()),
        CacheAction::Clear => state.metadata.clear()?,
        CacheAction::Invalidate { game } => {
            for kind in MetadataKind::all() {
                state.metadata.invalidate(&game, *kind)?;
            }
        }
    }
    Ok(())
}

fn source_label(source: Source) -> &'static str {
    match source {
        Source::Api => "GOG API",
        Source::ManifestFallback => "manifest",
    }
}
