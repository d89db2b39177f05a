pub mod cmd_camera;
pub mod cmd_dcc;
pub mod cmd_loco;
pub mod cmd_monitor;
pub mod cmd_ports;
pub mod common;
pub mod config;
