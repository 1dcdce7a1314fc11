//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Admin-only ledger commands
pub mod admin;

/// Rim fitting commands
pub mod fitting;

/// General utility commands
pub mod general;

/// Package purchase commands
pub mod shop;

use crate::{bot::BotData, errors::Error};

/// Every command the bot registers.
#[must_use]
pub fn all() -> Vec<poise::Command<BotData, Error>> {
    vec![
        general::ping(),
        general::help(),
        general::menu(),
        general::balance(),
        general::support(),
        fitting::fit(),
        fitting::photo(),
        fitting::confirm(),
        fitting::cancel(),
        fitting::video(),
        shop::shop(),
        shop::buy(),
        shop::check(),
        admin::stats(),
        admin::users(),
        admin::addcredits(),
        admin::setbalance(),
    ]
}
