mod config;
mod jpeg;
mod logging;
mod ports;
mod services;
mod spotify_rs;
mod synchronized;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;
use url::Url;

use crate::{
    config::Config,
    logging::setup_logging,
    ports::spotify::SpotifyClient,
    services::spotify::{
        client::SpotifyHttpAdapter,
        token::{SpotifyRefreshGrant, StoredTokenProvider, StoredTokens, TokenStore},
    },
    spotify_rs::{
        auth::{exchange_code_for_token, initiate_oauth, parse_callback_url},
        client::{SPOTIFY_API_BASE, SpotifyWebApi},
    },
    synchronized::{
        Discovery, SYNCHRONIZED_MARKER, SynchronizationDefinition, SynchronizationService,
        SynchronizedPlaylist,
    },
};

type Client = SpotifyHttpAdapter<StoredTokenProvider<SpotifyRefreshGrant>>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "SYNCED_PLAYLISTS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Console log level (default: warn)
    #[arg(long, default_value = "warn", global = true, env = "LOG_LEVEL")]
    log_level: LevelFilter,

    /// File log level (default: debug)
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: LevelFilter,

    /// Path to log file
    #[arg(long, env = "SYNCED_PLAYLISTS_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(subcommand)]
    Auth(AuthCommands),
    /// List the playlists you own
    Playlists,
    /// List synchronized playlists and the playlists they are built from
    List,
    /// Create a new synchronized playlist
    Create {
        /// Name of the new playlist
        #[arg(short, long)]
        name: String,

        /// Playlists whose tracks are included
        #[arg(short, long, required = true, num_args = 1..)]
        include: Vec<String>,

        /// Playlists whose tracks are removed
        #[arg(short, long, num_args = 1..)]
        exclude: Vec<String>,

        /// Playlists a track must appear in to be kept
        #[arg(short, long, num_args = 1..)]
        require: Vec<String>,
    },
    /// Synchronize one playlist, or all of them when no id is given
    Sync {
        playlist_id: Option<String>,
    },
    /// Delete a synchronized playlist
    Delete {
        playlist_id: String,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum AuthCommands {
    /// Log in to Spotify and store the tokens
    Login,
    /// Forget the stored tokens
    Logout,
    /// Show the account the stored tokens belong to
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

fn spotify_client(config: &Config) -> Result<Arc<Client>> {
    let api_base = Url::parse(SPOTIFY_API_BASE).wrap_err("Invalid Spotify API url")?;
    let tokens = StoredTokenProvider::new(
        TokenStore::new(config.token_path()?),
        SpotifyRefreshGrant::new(config.client_id.clone()),
    );
    Ok(Arc::new(SpotifyHttpAdapter::new(
        SpotifyWebApi::new(api_base),
        tokens,
    )))
}

/// Cancels the returned token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

async fn login(config: &Config) -> Result<()> {
    let (auth, session) = initiate_oauth(&config.client_id, &config.redirect_uri);
    println!("Open this url in your browser and authorize the app:\n\n{}\n", auth.auth_url);
    println!("Then paste the url you were redirected to:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .wrap_err("Failed to read the redirect url")?;

    let code = parse_callback_url(line.trim(), &session)?;
    let response = exchange_code_for_token(
        &config.client_id,
        &code,
        &config.redirect_uri,
        &session.code_verifier,
    )
    .await?;
    let tokens = StoredTokens::from_response(response, None, chrono::Utc::now().timestamp())
        .ok_or_else(|| eyre!("Spotify did not return a refresh token"))?;

    let store = TokenStore::new(config.token_path()?);
    store.save(&tokens)?;
    tracing::info!("Stored tokens at {}", store.path().display());

    let user = spotify_client(config)?.current_user().await?;
    println!(
        "Logged in as {}",
        user.display_name.unwrap_or(user.id)
    );
    Ok(())
}

fn print_synchronized(synchronized: &SynchronizedPlaylist) {
    let names = |playlists: &[ports::spotify::Playlist]| {
        playlists
            .iter()
            .map(|playlist| playlist.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!("{}", synchronized.playlist);
    if let Some(url) = &synchronized.playlist.spotify_url {
        println!("  url:      {}", url);
    }
    println!("  include:  {}", names(&synchronized.groups.included));
    if !synchronized.groups.excluded.is_empty() {
        println!("  exclude:  {}", names(&synchronized.groups.excluded));
    }
    if !synchronized.groups.required.is_empty() {
        println!("  require:  {}", names(&synchronized.groups.required));
    }
}

fn print_discovery(discovery: &Discovery) {
    for synchronized in &discovery.playlists {
        print_synchronized(synchronized);
    }
    for failure in &discovery.failures {
        eprintln!("Skipped {}: {}", failure.playlist, failure.error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_logging(args.log_level, args.log_file.clone(), args.log_file_level)?;

    if let Commands::Config(config_commands) = &args.command {
        match config_commands {
            ConfigCommands::CreateDefault => {
                let path = match &args.config {
                    Some(path) => {
                        Config::create_default_at(path)?;
                        path.clone()
                    }
                    None => Config::create_default()?,
                };
                println!("Created {}", path.display());
            }
            ConfigCommands::Path => match args.config.clone().or_else(Config::config_path) {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        }
        return Ok(());
    }

    tracing::debug!("Loading configuration");
    let config = match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .wrap_err("Failed to load synced-playlists config, see `synced-playlists config create-default`")?;

    let client = spotify_client(&config)?;
    let service = SynchronizationService::new(
        client.clone(),
        Arc::new(config.carrier()),
        config.cover_policy(),
    );

    match args.command {
        Commands::Auth(AuthCommands::Login) => login(&config).await?,
        Commands::Auth(AuthCommands::Logout) => {
            let store = TokenStore::new(config.token_path()?);
            if store.clear()? {
                println!("Removed {}", store.path().display());
            } else {
                println!("Not logged in");
            }
        }
        Commands::Auth(AuthCommands::Status) => {
            let user = client.current_user().await?;
            println!(
                "Logged in as {} ({})",
                user.display_name.as_deref().unwrap_or("?"),
                user.id
            );
        }
        Commands::Playlists => {
            for playlist in client.list_owned_playlists().await? {
                let marker = if playlist.description == SYNCHRONIZED_MARKER {
                    " [synchronized]"
                } else {
                    ""
                };
                println!("{}\t{}{}", playlist.id, playlist.name, marker);
            }
        }
        Commands::List => {
            let discovery = service.discover().await?;
            print_discovery(&discovery);
        }
        Commands::Create {
            name,
            include,
            exclude,
            require,
        } => {
            let cancel = cancel_on_ctrl_c();
            let definition = SynchronizationDefinition::new(include, exclude, require);
            let groups = service.resolve(&definition).await?;
            let created = service.create(&name, groups, &cancel).await?;

            print_synchronized(&created);
            if created.playlist.cover.is_none() {
                eprintln!(
                    "Warning: the cover was not confirmed yet, `list` may not show this playlist"
                );
            }
        }
        Commands::Sync {
            playlist_id: Some(playlist_id),
        } => {
            let (synchronized, count) = service.resynchronize_by_id(&playlist_id).await?;
            println!("{}: {} tracks", synchronized.playlist, count);
        }
        Commands::Sync { playlist_id: None } => {
            let report = service.resynchronize_all().await?;
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(count) => println!("{}: {} tracks", outcome.playlist, count),
                    Err(error) => eprintln!("{}: failed: {}", outcome.playlist, error),
                }
            }
            for skipped in &report.skipped {
                eprintln!("Skipped {}: {}", skipped.playlist, skipped.error);
            }

            let failed = report.failed();
            if failed > 0 {
                return Err(eyre!("{} playlists could not be synchronized", failed));
            }
        }
        Commands::Delete { playlist_id } => {
            let playlist = service.delete(&playlist_id).await?;
            println!("Deleted {}", playlist);
        }
        Commands::Config(_) => {}
    }

    Ok(())
}
