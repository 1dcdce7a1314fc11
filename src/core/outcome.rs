//! User-facing outcomes.
//!
//! Core operations answer with an [`Outcome`] (text, optional media, optional buttons) and
//! never talk to the chat platform themselves; the bot layer decides how to render it.

use crate::{
    config::{Packages, Settings},
    entities::UserModel,
    processor::format_amount,
};

/// Rough category of an outcome, useful for rendering and for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Menu,
    /// Asking the user for the next input
    Prompt,
    Success,
    Failure,
    InsufficientBalance,
    Shop,
    PaymentLink,
    RetryLater,
    Info,
}

/// A button press the bot routes back into the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    StartFitting,
    ReplaceCar,
    ReplaceWheel,
    Confirm,
    Cancel,
    Video,
    Shop,
    Buy(String),
    CheckPayment(String),
    Balance,
    Support,
    Help,
    Menu,
}

impl Action {
    /// Stable identifier used as the button's custom id.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::StartFitting => "fit:start".to_string(),
            Self::ReplaceCar => "fit:car".to_string(),
            Self::ReplaceWheel => "fit:wheel".to_string(),
            Self::Confirm => "fit:confirm".to_string(),
            Self::Cancel => "fit:cancel".to_string(),
            Self::Video => "fit:video".to_string(),
            Self::Shop => "shop".to_string(),
            Self::Buy(label) => format!("buy:{label}"),
            Self::CheckPayment(payment_id) => format!("check:{payment_id}"),
            Self::Balance => "balance".to_string(),
            Self::Support => "support".to_string(),
            Self::Help => "help".to_string(),
            Self::Menu => "menu".to_string(),
        }
    }

    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        if let Some(label) = id.strip_prefix("buy:") {
            return Some(Self::Buy(label.to_string()));
        }
        if let Some(payment_id) = id.strip_prefix("check:") {
            return Some(Self::CheckPayment(payment_id.to_string()));
        }
        let action = match id {
            "fit:start" => Self::StartFitting,
            "fit:car" => Self::ReplaceCar,
            "fit:wheel" => Self::ReplaceWheel,
            "fit:confirm" => Self::Confirm,
            "fit:cancel" => Self::Cancel,
            "fit:video" => Self::Video,
            "shop" => Self::Shop,
            "balance" => Self::Balance,
            "support" => Self::Support,
            "help" => Self::Help,
            "menu" => Self::Menu,
            _ => return None,
        };
        Some(action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    Action { label: String, action: Action },
    Link { label: String, url: String },
}

/// In-memory file attached to an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub text: String,
    pub media: Option<Attachment>,
    pub keyboard: Vec<Button>,
}

impl Outcome {
    pub fn new(kind: OutcomeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            media: None,
            keyboard: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_media(mut self, file_name: &str, bytes: Vec<u8>) -> Self {
        self.media = Some(Attachment {
            file_name: file_name.to_string(),
            bytes,
        });
        self
    }

    #[must_use]
    pub fn with_action(mut self, label: &str, action: Action) -> Self {
        self.keyboard.push(Button::Action {
            label: label.to_string(),
            action,
        });
        self
    }

    #[must_use]
    pub fn with_link(mut self, label: &str, url: &str) -> Self {
        self.keyboard.push(Button::Link {
            label: label.to_string(),
            url: url.to_string(),
        });
        self
    }
}

/// Balance as shown to the user; admins see `∞`.
#[must_use]
pub fn balance_display(user: &UserModel) -> String {
    if user.is_admin {
        "∞".to_string()
    } else {
        user.balance.to_string()
    }
}

pub fn menu(user: &UserModel) -> Outcome {
    Outcome::new(
        OutcomeKind::Menu,
        format!(
            "🏁 **Rim fitting**\nYour balance: {} generations.\n\nSend a photo of your car and of the rims you like, and I'll show you how they look together.",
            balance_display(user)
        ),
    )
    .with_action("🚘 Try on rims", Action::StartFitting)
    .with_action("🛒 Shop", Action::Shop)
    .with_action("💳 Balance", Action::Balance)
    .with_action("🆘 Support", Action::Support)
}

pub fn balance(user: &UserModel) -> Outcome {
    Outcome::new(
        OutcomeKind::Info,
        format!("💳 Your balance: {} generations.", balance_display(user)),
    )
    .with_action("🛒 Shop", Action::Shop)
    .with_action("🏁 Menu", Action::Menu)
}

pub fn support(settings: &Settings) -> Outcome {
    Outcome::new(
        OutcomeKind::Info,
        format!(
            "🆘 Something went wrong or have a question? Contact {}.",
            settings.support_contact
        ),
    )
    .with_action("🏁 Menu", Action::Menu)
}

#[must_use]
pub fn help() -> Outcome {
    Outcome::new(
        OutcomeKind::Info,
        "**How it works**\n\
        1. `/fit` starts a new fitting.\n\
        2. `/photo` uploads the car photo, then the rim photo.\n\
        3. `/confirm` spends 1 generation and renders the result.\n\
        4. `/video` turns the latest result into a fly-around clip for 3 generations.\n\n\
        `/shop` buys generations, `/check <payment>` refreshes a payment, `/balance` shows what's left.",
    )
    .with_action("🚘 Try on rims", Action::StartFitting)
}

/// Package list with one buy button per package.
pub fn shop(packages: &Packages, settings: &Settings, headline: &str) -> Outcome {
    let mut text = format!("{headline}\n");
    let mut outcome = Outcome::new(OutcomeKind::Shop, String::new());
    for package in packages.iter() {
        text.push_str(&format!(
            "\n• **{}**: {} generations for {} {}",
            package.name,
            package.credits,
            format_amount(package.amount),
            settings.currency
        ));
        outcome = outcome.with_action(&package.name, Action::Buy(package.label.clone()));
    }
    outcome.text = text;
    outcome
}

#[must_use]
pub fn retry_later(what: &str) -> Outcome {
    Outcome::new(
        OutcomeKind::RetryLater,
        format!("⚠️ Couldn't {what} right now. Please try again in a few minutes."),
    )
    .with_action("🏁 Menu", Action::Menu)
}
