//! Fetch a title, person or search page from TMDB and print the mapped view as pretty JSON.
//! Usage:
//!   cargo run --bin tmdb_probe -- movie <tmdb_id>
//!   cargo run --bin tmdb_probe -- tv <tmdb_id>
//!   cargo run --bin tmdb_probe -- person <tmdb_id>
//!   cargo run --bin tmdb_probe -- search <query> [page]
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use movie_explorer::discovery;
use movie_explorer::models::{MediaFilter, MediaType};
use movie_explorer::tmdb::{ImageBase, TmdbApi, TmdbClient};
use movie_explorer::views;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let api_key = env::var("TMDB_API_KEY").context("Missing TMDB_API_KEY in environment")?;
    let client = match env::var("TMDB_BASE_URL") {
        Ok(base) if !base.is_empty() => TmdbClient::new(api_key, base)?,
        _ => TmdbClient::with_key(api_key)?,
    };
    let images = env::var("TMDB_IMAGE_BASE_URL")
        .map(ImageBase::new)
        .unwrap_or_default();

    let args: Vec<String> = env::args().skip(1).collect();
    let (kind, rest) = args
        .split_first()
        .ok_or_else(|| anyhow!("usage: tmdb_probe <movie|tv|person|search> <id|query> [page]"))?;

    let output = match kind.as_str() {
        "search" => {
            let query = rest
                .first()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .ok_or_else(|| anyhow!("search needs a query"))?;
            let page = rest
                .get(1)
                .map(|p| p.parse::<u32>())
                .transpose()
                .context("page must be a number")?
                .unwrap_or(1);
            let results =
                discovery::search(&client, &query, page, MediaFilter::All, &images).await?;
            serde_json::to_value(results)?
        }
        other => {
            let media: MediaType = other.parse()?;
            let id: i32 = rest
                .first()
                .ok_or_else(|| anyhow!("{} needs a TMDB id", media))?
                .parse()
                .context("TMDB id must be a number")?;
            match media {
                MediaType::Movie => {
                    serde_json::to_value(views::movie_view(client.movie_details(id).await?, &images))?
                }
                MediaType::Tv => {
                    serde_json::to_value(views::tv_view(client.tv_details(id).await?, &images))?
                }
                MediaType::Person => serde_json::to_value(views::person_view(
                    client.person_details(id).await?,
                    &images,
                ))?,
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
