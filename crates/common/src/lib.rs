// repository-sync-common: request types and credential URLs shared by the sync crates

pub mod credentials;
pub mod types;
