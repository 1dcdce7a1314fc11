//! Tariff package loading from config.toml
//!
//! Packages map a short label (used in checkout commands and invoice payloads) to a price in
//! minor currency units and the number of credits it buys. When no `config.toml` exists the
//! built-in tariff is used.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Purchasable credit packages, in display order
    pub packages: Vec<Package>,
}

/// A single purchasable credit package
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Package {
    /// Stable identifier, e.g. `"three"`
    pub label: String,
    /// Human-readable name shown in the shop
    pub name: String,
    /// Price in minor currency units (kopeks, cents)
    pub amount: i64,
    /// Credits granted once paid
    pub credits: i64,
}

/// The tariff table shared by checkout, in-band payments and the shop outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packages(Vec<Package>);

impl Packages {
    /// Builds a tariff table, rejecting empty, duplicated or non-positive entries.
    pub fn new(packages: Vec<Package>) -> Result<Self> {
        if packages.is_empty() {
            return Err(Error::Config {
                message: "At least one package must be configured".to_string(),
            });
        }
        for (index, package) in packages.iter().enumerate() {
            if package.amount <= 0 || package.credits <= 0 {
                return Err(Error::Config {
                    message: format!(
                        "Package '{}' must have a positive amount and credits",
                        package.label
                    ),
                });
            }
            if packages[..index].iter().any(|p| p.label == package.label) {
                return Err(Error::Config {
                    message: format!("Duplicate package label '{}'", package.label),
                });
            }
        }
        Ok(Self(packages))
    }

    #[must_use]
    pub fn find(&self, label: &str) -> Option<&Package> {
        self.0.iter().find(|p| p.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.0.iter()
    }
}

impl Default for Packages {
    fn default() -> Self {
        let package = |label: &str, name: &str, amount, credits| Package {
            label: label.to_string(),
            name: name.to_string(),
            amount,
            credits,
        };
        Self(vec![
            package("one", "1 generation", 19_900, 1),
            package("three", "3 generations", 29_900, 3),
            package("five", "5 generations", 39_900, 5),
            package("ten", "10 generations", 49_900, 10),
        ])
    }
}

/// Loads the tariff table from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A package is invalid or duplicated
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Packages> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    Packages::new(config.packages)
}

/// Loads packages from `./config.toml`, falling back to the built-in tariff when absent.
pub fn load_default_config() -> Result<Packages> {
    let path = Path::new("config.toml");
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!("No config.toml found, using built-in packages");
        Ok(Packages::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_package_config() {
        let toml_str = r#"
            [[packages]]
            label = "one"
            name = "Single"
            amount = 19900
            credits = 1

            [[packages]]
            label = "ten"
            name = "Ten pack"
            amount = 49900
            credits = 10
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let packages = Packages::new(config.packages).unwrap();
        assert_eq!(packages.iter().count(), 2);
        assert_eq!(packages.find("ten").unwrap().credits, 10);
        assert_eq!(packages.find("one").unwrap().amount, 19_900);
        assert!(packages.find("three").is_none());
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert!(Packages::new(Vec::new()).is_err());

        let bad = Package {
            label: "free".to_string(),
            name: "Free".to_string(),
            amount: 0,
            credits: 1,
        };
        assert!(matches!(Packages::new(vec![bad]), Err(Error::Config { .. })));

        let (first, second) = (Packages::default(), Packages::default());
        let dup: Vec<Package> = first.iter().chain(second.iter()).cloned().collect();
        assert!(matches!(Packages::new(dup), Err(Error::Config { .. })));
    }

    #[test]
    fn test_default_tariff() {
        let packages = Packages::default();
        assert_eq!(packages.find("three").unwrap().credits, 3);
        assert_eq!(packages.find("five").unwrap().amount, 39_900);
    }
}
