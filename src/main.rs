use anyhow::Result;
use homepage_core::{AppError, Config};
use homepage_gateway::Gateway;

#[tokio::main]
async fn main() -> Result<()> {
    homepage_core::init()?;

    let (config, _validation) = Config::load_validated()?;
    tracing::info!("Config directory: {}", config.config_dir.display());

    let gateway = Gateway::new(&config)?;

    let (quote, playlist, weather) = tokio::join!(
        gateway.get_hitokoto(),
        gateway.get_configured_playlist(),
        gateway.get_local_weather(&config.weather),
    );

    match quote {
        Ok(quote) => println!(
            "{}  -- {}",
            quote["hitokoto"].as_str().unwrap_or_default(),
            quote["from"].as_str().unwrap_or_default()
        ),
        Err(e) => report("hitokoto", e.into()),
    }

    match playlist {
        Ok(tracks) => {
            tracing::info!("Loaded {} tracks", tracks.len());
            for track in &tracks {
                println!("{} - {}  {}", track.artist, track.name, track.url);
            }
        }
        Err(e) => report("playlist", e.into()),
    }

    match weather {
        Ok(weather) => println!("{}", serde_json::to_string_pretty(&weather)?),
        Err(e) => report("weather", e.into()),
    }

    Ok(())
}

fn report(what: &str, err: AppError) {
    tracing::error!("Failed to load {}: {}", what, err);
    eprintln!("{}: {}", what, err.user_message());
}
