//! HTTP fetcher for the server's leaderboard endpoint.
//!
//! The game server exposes standings as JSON at `GET {base}/leaderboard`,
//! with rows keyed by the server's exported field names (`Username`,
//! `GamesPlayed`, …). The session controller performs no leaderboard I/O
//! itself — consumers refetch once per
//! [`GameConcluded`](crate::ConnectFourEvent::GameConcluded) event.
//!
//! Only available with the `leaderboard` feature.

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;

/// One leaderboard row as served by the game server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeaderboardEntry {
    /// Player display name.
    #[serde(rename = "Username")]
    pub username: String,
    /// Total games recorded for this player.
    #[serde(rename = "GamesPlayed")]
    pub games_played: u32,
    /// Games won.
    #[serde(rename = "Wins")]
    pub wins: u32,
    /// Games lost.
    #[serde(rename = "Losses")]
    pub losses: u32,
    /// Games drawn.
    #[serde(rename = "Draws")]
    pub draws: u32,
    /// Games played against the server bot.
    #[serde(rename = "BotGames")]
    pub bot_games: u32,
}

/// Client for the leaderboard HTTP endpoint.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), connect_four_client::ConnectFourError> {
/// use connect_four_client::LeaderboardClient;
///
/// let leaderboard = LeaderboardClient::new("http://localhost:8080");
/// for row in leaderboard.fetch().await? {
///     println!("{}: {} wins", row.username, row.wins);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LeaderboardClient {
    http: reqwest::Client,
    url: String,
}

impl LeaderboardClient {
    /// Create a client for the server at `base_url` (scheme + host + port,
    /// no trailing slash required).
    pub fn new(base_url: impl AsRef<str>) -> Self {
        let base = base_url.as_ref().trim_end_matches('/');
        Self {
            http: reqwest::Client::new(),
            url: format!("{base}/leaderboard"),
        }
    }

    /// Fetch the current standings.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectFourError::Leaderboard`](crate::ConnectFourError::Leaderboard)
    /// when the request fails or the response is not valid leaderboard JSON.
    pub async fn fetch(&self) -> Result<Vec<LeaderboardEntry>> {
        debug!(url = %self.url, "fetching leaderboard");
        let rows = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<LeaderboardEntry>>()
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn entry_decodes_server_field_names() {
        let json = r#"[{
            "Username": "alice",
            "GamesPlayed": 12,
            "Wins": 7,
            "Losses": 4,
            "Draws": 1,
            "BotGames": 9
        }]"#;
        let rows: Vec<LeaderboardEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username, "alice");
        assert_eq!(rows[0].games_played, 12);
        assert_eq!(rows[0].wins, 7);
        assert_eq!(rows[0].bot_games, 9);
    }

    #[test]
    fn base_url_trailing_slash_is_tolerated() {
        let client = LeaderboardClient::new("http://localhost:8080/");
        assert_eq!(client.url, "http://localhost:8080/leaderboard");
    }
}
