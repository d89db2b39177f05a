use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dccex::station::{self, StationState};
use dccex::{
    DccSession, JsonFileStore, KeyValueStore, NativePortProvider, PipeProvider, PortProvider,
    Throttle,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Settings;

/// How long to keep collecting station output after the last chunk.
pub const REPLY_WINDOW: Duration = Duration::from_millis(300);

/// Connected session plus the simulated station serving it, if any.
pub struct Link {
    pub session: Arc<DccSession>,
    station: Option<JoinHandle<StationState>>,
}

impl Link {
    /// Disconnect and wait for the simulated station to wind down.
    pub async fn close(self) -> Result<()> {
        self.session.disconnect().await.context("close serial port")?;
        if let Some(station) = self.station {
            let state = station.await.context("simulated station task")?;
            debug!(commands = ?state.commands, "simulated station transcript");
        }
        Ok(())
    }
}

/// Open the configured port (or the simulated station) and connect.
pub async fn connect(settings: &Settings) -> Result<Link> {
    let (provider, station): (Arc<dyn PortProvider>, _) = if settings.simulate {
        let provider = PipeProvider::new();
        let far_end = provider.attach("simulated", 4096);
        (Arc::new(provider), Some(tokio::spawn(station::serve(far_end))))
    } else {
        let port = settings
            .port
            .clone()
            .ok_or_else(|| anyhow!("no serial port configured; pass --port or --simulate"))?;
        (Arc::new(NativePortProvider::new(port)), None)
    };
    let session = Arc::new(DccSession::new(provider, settings.session.clone()));
    session
        .connect()
        .await
        .context("connect to command station")?;
    info!(
        port = settings.port.as_deref().unwrap_or("simulated"),
        baud_rate = settings.session.baud_rate,
        "connected"
    );
    Ok(Link { session, station })
}

pub fn open_store(settings: &Settings) -> Arc<dyn KeyValueStore> {
    Arc::new(JsonFileStore::new(&settings.state_file))
}

/// Throttle on `address` (or the configured initial address).
pub fn open_throttle(
    settings: &Settings,
    session: Arc<DccSession>,
    address: Option<i64>,
) -> Result<Throttle> {
    let mut throttle = Throttle::new(session, open_store(settings), &settings.throttle);
    if let Some(address) = address {
        throttle
            .set_address(address)
            .with_context(|| format!("select locomotive {address}"))?;
    }
    Ok(throttle)
}

/// Collect station output until it stays quiet for `window`.
pub async fn collect_responses(
    responses: &mut watch::Receiver<String>,
    window: Duration,
) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(Ok(())) = tokio::time::timeout(window, responses.changed()).await {
        let text = responses.borrow_and_update().clone();
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }
    lines
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, Settings};

    #[tokio::test]
    async fn simulated_link_round_trips() {
        let settings = Settings::load(
            None,
            Overrides {
                simulate: true,
                ..Overrides::default()
            },
        )
        .unwrap();
        let link = connect(&settings).await.unwrap();
        let mut responses = link.session.subscribe_responses();
        link.session.set_track_power(true).await.unwrap();
        let lines = collect_responses(&mut responses, Duration::from_millis(200)).await;
        assert_eq!(lines, vec!["<p1>".to_string()]);
        link.close().await.unwrap();
    }

    #[tokio::test]
    async fn real_port_requires_a_path() {
        let settings = Settings::load(None, Overrides::default()).unwrap();
        let err = connect(&settings).await.err().unwrap();
        assert!(err.to_string().contains("--port"));
    }
}
