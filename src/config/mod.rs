/// Database configuration and connection management
pub mod database;

/// Tariff packages loaded from config.toml
pub mod packages;

/// Environment driven runtime settings
pub mod settings;

pub use packages::{Package, Packages};
pub use settings::{ADMIN_BALANCE, ReceiptSettings, Settings, YooKassaSettings};
