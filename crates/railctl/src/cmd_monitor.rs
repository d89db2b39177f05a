use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::common;
use crate::config::Settings;

#[derive(Serialize)]
struct ResponseLine<'a> {
    elapsed_ms: u128,
    line: &'a str,
}

/// Print station output until Ctrl-C or `duration_s` elapses (0 = forever).
pub async fn run(settings: &Settings, status: bool, duration_s: u64, json: bool) -> Result<()> {
    let link = common::connect(settings).await?;
    let mut responses = link.session.subscribe_responses();
    if status {
        link.session.status().await.context("request status")?;
    }
    let started = tokio::time::Instant::now();
    let deadline = (duration_s > 0).then(|| started + Duration::from_secs(duration_s));
    info!(duration_s, "monitoring station output");

    loop {
        let until_deadline = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = until_deadline => break,
            changed = responses.changed() => {
                if changed.is_err() {
                    break;
                }
                let text = responses.borrow_and_update().clone();
                for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    if json {
                        let entry = ResponseLine {
                            elapsed_ms: started.elapsed().as_millis(),
                            line,
                        };
                        println!("{}", serde_json::to_string(&entry).context("serialise line")?);
                    } else {
                        println!("{line}");
                    }
                }
            }
        }
    }

    link.close().await
}
