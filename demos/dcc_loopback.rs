use std::env;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dccex::station;
use dccex::{
    DccSession, Direction, MemoryStore, NativePortProvider, PipeProvider, PortProvider,
    SessionConfig, Throttle, ThrottleConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    // `--port /dev/ttyACM0` talks to real hardware; otherwise a simulated station answers.
    let args: Vec<String> = env::args().collect();
    let port = args
        .iter()
        .position(|arg| arg == "--port")
        .and_then(|idx| args.get(idx + 1).cloned());

    info!(port = port.as_deref().unwrap_or("simulated"), "opening command station");
    let (provider, station): (Arc<dyn PortProvider>, _) = match port {
        Some(path) => (Arc::new(NativePortProvider::new(path)), None),
        None => {
            let provider = PipeProvider::new();
            let far_end = provider.attach("loopback", 4096);
            (Arc::new(provider), Some(tokio::spawn(station::serve(far_end))))
        }
    };

    let session = Arc::new(DccSession::new(provider, SessionConfig::default()));
    let mut responses = session.subscribe_responses();
    session.connect().await?;

    let mut throttle = Throttle::new(
        session.clone(),
        Arc::new(MemoryStore::new()),
        &ThrottleConfig::default(),
    );
    throttle.set_track_power(true).await?;
    throttle.set_speed(40).await?;
    throttle.set_direction(Direction::Backward).await?;
    let lights = throttle.toggle_function(0).await?;
    throttle.status().await?;

    while let Ok(Ok(())) = tokio::time::timeout(Duration::from_millis(300), responses.changed()).await {
        for line in responses.borrow_and_update().lines() {
            println!("station -> {line}");
        }
    }
    println!(
        "loco {} speed {} {} lights {}",
        throttle.address(),
        throttle.speed(),
        throttle.direction(),
        if lights { "on" } else { "off" }
    );

    throttle.emergency_stop().await?;
    session.disconnect().await?;
    if let Some(station) = station {
        let state = station.await?;
        println!("station saw {} commands: {:?}", state.commands.len(), state.commands);
    }
    Ok(())
}
