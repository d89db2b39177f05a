#![cfg_attr(docsrs, feature(doc_cfg))]
//! DCC-EX command station client.
//!
//! [`DccSession`] owns one serial link to a command station: it opens the
//! port, keeps a background reader publishing the latest response, and writes
//! newline-terminated `<...>` commands. [`Throttle`] drives one locomotive at
//! a time on top of a session and remembers per-address state in a
//! [`KeyValueStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use dccex::{DccSession, MemoryStore, NativePortProvider, SessionConfig, Throttle, ThrottleConfig};
//!
//! # async fn demo() -> Result<(), dccex::DccError> {
//! let session = Arc::new(DccSession::new(
//!     Arc::new(NativePortProvider::new("/dev/ttyACM0")),
//!     SessionConfig::default(),
//! ));
//! session.connect().await?;
//! session.set_track_power(true).await?;
//! let mut throttle = Throttle::new(session, Arc::new(MemoryStore::new()), &ThrottleConfig::default());
//! throttle.set_speed(40).await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod loco;
pub mod native;
pub mod session;
pub mod station;
pub mod store;
pub mod throttle;
pub mod transport;

pub use command::{Command, Direction, MAX_ADDRESS, MAX_FUNCTION, MAX_SPEED, MIN_ADDRESS};
pub use config::{SessionConfig, ThrottleConfig};
pub use error::{DccError, StoreError};
pub use loco::{LocoStore, LocomotiveState};
pub use native::{available_ports, NativePortProvider, PortInfo};
pub use session::{DccSession, SessionState};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use throttle::Throttle;
pub use transport::{PipeDevice, PipeProvider, PortProvider, SerialDevice};
