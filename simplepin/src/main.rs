use anyhow::Context;
use simplepin::app::AppRuntime;
use simplepin::config::AppConfig;
use simplepin::library::SearchScope;
use simplepin::preferences::PreferenceStore;
use simplepin::storage::{TOKEN_ENV, TokenStorage, resolve_token};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Search { query: String, scope: SearchScope },
    Watch,
    SetToken(String),
    Logout,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = None;
    let mut scope = SearchScope::All;
    let mut words = Vec::new();
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--watch" => mode = Some(CliMode::Watch),
            "--logout" => mode = Some(CliMode::Logout),
            "--help" | "-h" => mode = Some(CliMode::Help),
            "--tag" => scope = SearchScope::TagOnly,
            "--set-token" => {
                let token = args.next().context("--set-token requires a value")?;
                mode = Some(CliMode::SetToken(token));
            }
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => words.push(other.to_string()),
        }
    }
    Ok(mode.unwrap_or(CliMode::Search {
        query: words.join(" "),
        scope,
    }))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SIMPLEPIN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let mode = parse_cli_mode(std::env::args())?;
    match &mode {
        CliMode::Help => {
            println!("Usage: simplepin [--tag] [QUERY...] | --watch | --set-token TOKEN | --logout");
            println!("  QUERY              Print bookmarks matching every word");
            println!("  --tag              Match QUERY against tags only");
            println!("  --watch            Keep the cache fresh until interrupted");
            println!("  --set-token TOKEN  Save a Pinboard API token (username:HEX)");
            println!("  --logout           Remove the saved token and preferences");
            return Ok(());
        }
        CliMode::SetToken(token) => {
            TokenStorage::new()?.save_token(token)?;
            tracing::info!("api token saved");
            return Ok(());
        }
        CliMode::Logout => {
            TokenStorage::new()?.delete_token()?;
            let config = AppConfig::from_env()?;
            PreferenceStore::open(&config.preferences_path)?.clear()?;
            tracing::info!("saved token and preferences removed");
            return Ok(());
        }
        CliMode::Search { .. } | CliMode::Watch => {}
    }

    let config = AppConfig::from_env()?;
    let token = resolve_token(std::env::var(TOKEN_ENV).ok(), || {
        TokenStorage::new()?.get_token()
    })
    .context("no api token; run `simplepin --set-token username:TOKEN` first")?;
    let runtime = AppRuntime::bootstrap(config, token)?;
    match mode {
        CliMode::Search { query, scope } => runtime.search(&query, scope).await,
        _ => runtime.watch().await,
    }
}
