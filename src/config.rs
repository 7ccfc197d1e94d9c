//! Command line flags merged with environment fallbacks.
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use crate::models::{Game, Platform};
use crate::orchestrator::{GoldenFilter, RedeemOptions};
use crate::sources::{KeySource, OrcicornSource, RedditSource, SourceKind};
use crate::util::env::is_truthy;

pub const DEFAULT_LIMIT: u32 = 200;
pub const DEFAULT_DB_PATH: &str = "data/keys.db";

/// Environment keys included in the startup snapshot.
pub const ENV_KEYS: &[&str] = &[
    "SHIFT_USER",
    "SHIFT_PASS",
    "SHIFT_GAMES",
    "SHIFT_PLATFORMS",
    "SHIFT_GOLDEN",
    "SHIFT_NON_GOLDEN",
    "SHIFT_LIMIT",
    "SHIFT_SCHEDULE",
    "SHIFT_VERBOSE",
    "SHIFT_DB_PATH",
    "SHIFT_SOURCES",
    "SHIFT_FEED_URL",
    "SHIFT_REDDIT_URL",
    "SHIFT_REDDIT_GAME",
    "APPRISE_URL",
    "APPRISE_API",
];

#[derive(Parser, Debug, Default)]
#[command(
    name = "autoshift",
    version,
    about = "Automatically redeem SHiFT codes for Borderlands-family games"
)]
pub struct Cli {
    /// SHiFT account e-mail (prompted for on a terminal when missing)
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// SHiFT account password (prompted for on a terminal when missing)
    #[arg(short = 'p', long = "pass")]
    pub pass: Option<String>,

    /// Only redeem golden keys
    #[arg(long, default_value_t = false)]
    pub golden: bool,

    /// Only redeem non-golden keys
    #[arg(long, default_value_t = false)]
    pub non_golden: bool,

    /// Games to redeem codes for (default: all)
    #[arg(long, num_args = 1..)]
    pub games: Vec<Game>,

    /// Platforms to redeem codes on (default: all but universal)
    #[arg(long, num_args = 1..)]
    pub platforms: Vec<Platform>,

    /// Max number of golden keys to redeem
    #[arg(long)]
    pub limit: Option<u32>,

    /// Keep running and redeem every N hours (minimum 2)
    #[arg(long, num_args = 0..=1, default_missing_value = "2")]
    pub schedule: Option<f64>,

    /// Verbose logging
    #[arg(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Key database path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Discovery sources to poll
    #[arg(long, value_delimiter = ',')]
    pub sources: Vec<SourceKind>,
}

/// Effective settings after merging CLI flags over environment values.
#[derive(Debug, Clone)]
pub struct Settings {
    pub user: Option<String>,
    pub password: Option<String>,
    pub games: Vec<Game>,
    pub platforms: Vec<Platform>,
    pub filter: GoldenFilter,
    pub limit: u32,
    /// Requested hours between runs, unclamped.
    pub schedule: Option<f64>,
    pub db_path: PathBuf,
    pub sources: Vec<SourceKind>,
    pub feed_url: Option<String>,
    pub reddit_url: Option<String>,
    pub reddit_game: Game,
    pub apprise_url: Option<String>,
    pub apprise_api: Option<String>,
}

fn parse_list<T>(raw: &str, what: &str) -> Result<Vec<T>>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| anyhow!("{what}: {e}")))
        .collect()
}

impl Settings {
    /// Merge `cli` over values returned by `env` (normally [`crate::util::env::env_opt`]).
    pub fn resolve(cli: Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| env(key).is_some_and(|v| is_truthy(&v));

        let golden = cli.golden || flag("SHIFT_GOLDEN");
        let non_golden = cli.non_golden || flag("SHIFT_NON_GOLDEN");
        let filter = match (golden, non_golden) {
            (true, true) => bail!("--golden and --non-golden are mutually exclusive"),
            (true, false) => GoldenFilter::GoldenOnly,
            (false, true) => GoldenFilter::NonGoldenOnly,
            (false, false) => GoldenFilter::Any,
        };

        let mut games = cli.games;
        if games.is_empty() {
            if let Some(raw) = env("SHIFT_GAMES") {
                games = parse_list(&raw, "SHIFT_GAMES")?;
            }
        }
        if games.is_empty() {
            games = Game::ALL.to_vec();
        }
        dedup_in_place(&mut games);

        let mut platforms = cli.platforms;
        if platforms.is_empty() {
            if let Some(raw) = env("SHIFT_PLATFORMS") {
                platforms = parse_list(&raw, "SHIFT_PLATFORMS")?;
            }
        }
        if platforms.contains(&Platform::Universal) {
            bail!("`universal` is not a redeemable platform; list concrete platforms instead");
        }
        if platforms.is_empty() {
            platforms = Platform::concrete().collect();
        }
        dedup_in_place(&mut platforms);

        let limit = cli
            .limit
            .or_else(|| env("SHIFT_LIMIT").and_then(|v| v.trim().parse().ok()))
            .unwrap_or(DEFAULT_LIMIT);

        let schedule = match cli.schedule {
            Some(hours) => Some(hours),
            None => match env("SHIFT_SCHEDULE") {
                Some(raw) => Some(
                    raw.trim()
                        .parse::<f64>()
                        .map_err(|e| anyhow!("SHIFT_SCHEDULE `{raw}`: {e}"))?,
                ),
                None => None,
            },
        };

        let mut sources = cli.sources;
        if sources.is_empty() {
            if let Some(raw) = env("SHIFT_SOURCES") {
                sources = parse_list(&raw, "SHIFT_SOURCES")?;
            }
        }
        if sources.is_empty() {
            sources = vec![SourceKind::Orcicorn, SourceKind::Reddit];
        }
        dedup_in_place(&mut sources);

        let reddit_game = match env("SHIFT_REDDIT_GAME") {
            Some(raw) => raw.parse()?,
            None => Game::Bl4,
        };

        Ok(Self {
            user: cli.user.or_else(|| env("SHIFT_USER")),
            password: cli.pass.or_else(|| env("SHIFT_PASS")),
            games,
            platforms,
            filter,
            limit,
            schedule,
            db_path: cli
                .db
                .or_else(|| env("SHIFT_DB_PATH").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            sources,
            feed_url: env("SHIFT_FEED_URL"),
            reddit_url: env("SHIFT_REDDIT_URL"),
            reddit_game,
            apprise_url: env("APPRISE_URL"),
            apprise_api: env("APPRISE_API"),
        })
    }

    pub fn credentials(&self) -> Result<(String, String)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Ok((user.clone(), password.clone())),
            _ => bail!("SHiFT credentials missing: pass -u/-p or set SHIFT_USER and SHIFT_PASS"),
        }
    }

    /// Like [`Settings::credentials`], but asks on the terminal for whatever
    /// is missing when stdin is interactive.
    pub fn credentials_or_prompt(&self) -> Result<(String, String)> {
        if !std::io::stdin().is_terminal() {
            return self.credentials();
        }
        self.prompt_credentials(ask_terminal)
    }

    /// Fill missing credentials through `ask(label, hidden)`.
    pub fn prompt_credentials(
        &self,
        mut ask: impl FnMut(&str, bool) -> Result<String>,
    ) -> Result<(String, String)> {
        let user = match &self.user {
            Some(user) => user.clone(),
            None => ask("Username: ", false)?,
        };
        let password = match &self.password {
            Some(password) => password.clone(),
            None => ask("Password: ", true)?,
        };
        if user.is_empty() || password.is_empty() {
            bail!("SHiFT credentials missing: empty username or password");
        }
        Ok((user, password))
    }

    pub fn redeem_options(&self) -> RedeemOptions {
        RedeemOptions {
            games: self.games.clone(),
            platforms: self.platforms.clone(),
            filter: self.filter,
        }
    }

    pub fn build_sources(&self) -> Result<Vec<Box<dyn KeySource>>> {
        self.sources
            .iter()
            .map(|kind| {
                let source: Box<dyn KeySource> = match kind {
                    SourceKind::Orcicorn => Box::new(OrcicornSource::new(self.feed_url.clone())?),
                    SourceKind::Reddit => Box::new(RedditSource::new(
                        self.reddit_url.clone(),
                        self.reddit_game,
                    )?),
                };
                Ok(source)
            })
            .collect()
    }
}

fn ask_terminal(label: &str, hidden: bool) -> Result<String> {
    if hidden {
        let value = rpassword::prompt_password(label).context("reading password")?;
        return Ok(value.trim_end_matches(['\r', '\n']).to_string());
    }
    let mut stdout = std::io::stdout();
    write!(stdout, "{label}")?;
    stdout.flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading username")?;
    Ok(line.trim().to_string())
}

fn dedup_in_place<T: PartialEq + Copy>(items: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) {
            false
        } else {
            seen.push(*item);
            true
        }
    });
}
