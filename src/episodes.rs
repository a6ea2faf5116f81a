//! Podcast episode catalog, loaded at boot and upserted by slug.

use anyhow::Context;
use tracing::info;

use crate::models::NewEpisode;
use crate::repo::EpisodeRepo;

const BUNDLED: &str = include_str!("../seed/episodes.json");

pub fn parse_catalog(raw: &str) -> anyhow::Result<Vec<NewEpisode>> {
    let episodes: Vec<NewEpisode> =
        serde_json::from_str(raw).context("episode catalog is not valid JSON")?;
    if let Some(bad) = episodes.iter().find(|e| e.slug.trim().is_empty()) {
        anyhow::bail!("episode {} has an empty slug", bad.episode_number);
    }
    Ok(episodes)
}

/// The catalog from `EPISODES_FILE` when set, the bundled one otherwise.
pub fn load_catalog(path: Option<&str>) -> anyhow::Result<Vec<NewEpisode>> {
    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("reading episode catalog {p}"))?;
            parse_catalog(&raw)
        }
        None => parse_catalog(BUNDLED),
    }
}

pub async fn seed_episodes<R: EpisodeRepo + ?Sized>(
    repo: &R,
    catalog: Vec<NewEpisode>,
) -> anyhow::Result<usize> {
    let n = catalog.len();
    for ep in catalog {
        let slug = ep.slug.clone();
        repo.upsert_episode(ep).await.with_context(|| format!("upserting episode {slug}"))?;
    }
    info!(episodes = n, "episode catalog seeded");
    Ok(n)
}
