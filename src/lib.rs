pub mod constants;
pub mod gateway;
pub mod positions;
pub mod race;
pub mod registry;
pub mod server_protocol;
pub mod server_utils;
pub mod sessions;
pub mod types;
