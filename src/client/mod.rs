pub mod client;

pub use client::{ClientArgs, ClientError, InputError, run_client, send_payload, validate_len};
