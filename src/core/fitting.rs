//! Rim fitting flow - uploads, confirmation, debit, generation and the compensating refund.
//!
//! A generation attempt debits its cost up front. Every failure after a successful debit
//! (collaborator error, timeout, missing upload, storage error) runs [`refund`] as an
//! explicit step before the session returns to `Idle`, so a failed attempt always leaves
//! the balance where it started.

use crate::{
    context::AppContext,
    core::{
        ChatUser, ledger,
        ledger::Debit,
        outcome::{self, Action, Outcome, OutcomeKind},
        session::{AssetSlot, PendingUpload, SessionState},
    },
    errors::{Error, Result},
    media::{MediaKind, MediaRef},
};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Credits spent on one fitted image.
pub const IMAGE_COST: i64 = 1;
/// Credits spent on one fly-around video.
pub const VIDEO_COST: i64 = 3;

/// Starts a new fitting, superseding any previous one.
///
/// Users without credits are sent to the shop instead.
#[instrument(skip(ctx, user), fields(external_id = %user.external_id))]
pub async fn start(ctx: &AppContext, user: &ChatUser) -> Result<Outcome> {
    let account = user.ensure(ctx).await?;
    if !account.is_admin && account.balance <= 0 {
        return Ok(outcome::shop(
            &ctx.packages,
            &ctx.settings,
            "😔 You're out of generations. Pick a package to keep fitting:",
        ));
    }
    if !ctx.sessions.start(&user.external_id) {
        return Ok(busy());
    }

    Ok(Outcome::new(
        OutcomeKind::Prompt,
        "📸 **Step 1 of 2**\nSend a photo of your car, ideally from the side and without glare.",
    )
    .with_action("❌ Cancel", Action::Cancel))
}

/// Accepts an uploaded photo for whichever slot the session is waiting on.
#[instrument(skip(ctx, user, bytes), fields(external_id = %user.external_id, size = bytes.len()))]
pub async fn submit_photo(ctx: &AppContext, user: &ChatUser, bytes: Vec<u8>) -> Result<Outcome> {
    let id = user.external_id.as_str();
    let Some(slot) = ctx.sessions.expected_slot(id) else {
        return Ok(Outcome::new(
            OutcomeKind::Info,
            "I'm not waiting for a photo right now. Start a new fitting first.",
        )
        .with_action("🚘 Try on rims", Action::StartFitting));
    };
    if bytes.is_empty() {
        return Ok(Outcome::new(
            OutcomeKind::Prompt,
            "That file is empty, please send the photo again.",
        ));
    }

    let kind = match slot {
        AssetSlot::Primary => MediaKind::Car,
        AssetSlot::Secondary => MediaKind::Wheel,
    };
    let stored = match ctx.media.put(id, kind, &bytes).await {
        Ok(stored) => stored,
        Err(e) => {
            error!("Failed to store {:?} photo for {}: {}", kind, id, e);
            return Ok(outcome::retry_later("save your photo"));
        }
    };

    let outcome = match ctx.sessions.submit_asset(id, slot, stored) {
        Some(SessionState::AwaitingSecondaryAsset) => Outcome::new(
            OutcomeKind::Prompt,
            "🛞 **Step 2 of 2**\nNow send a photo of the rims, straight on and in good light.",
        )
        .with_action("↩️ Change car photo", Action::ReplaceCar)
        .with_action("❌ Cancel", Action::Cancel),
        Some(SessionState::AwaitingConfirmation) => Outcome::new(
            OutcomeKind::Prompt,
            format!("All set ✅\nSpend {IMAGE_COST} generation and run the fitting?"),
        )
        .with_action("✅ Run", Action::Confirm)
        .with_action("🔁 Replace car photo", Action::ReplaceCar)
        .with_action("🔁 Replace rim photo", Action::ReplaceWheel)
        .with_action("❌ Cancel", Action::Cancel),
        _ => Outcome::new(
            OutcomeKind::Info,
            "That photo arrived too late for this step. Check where your fitting is and try again.",
        ),
    };
    Ok(outcome)
}

/// Goes back to the car or rim upload step.
pub fn replace(ctx: &AppContext, user: &ChatUser, slot: AssetSlot) -> Outcome {
    if !ctx.sessions.request_replacement(&user.external_id, slot) {
        return Outcome::new(OutcomeKind::Info, "There is nothing to replace right now.")
            .with_action("🚘 Try on rims", Action::StartFitting);
    }
    let text = match slot {
        AssetSlot::Primary => "📸 Send the new car photo.",
        AssetSlot::Secondary => "🛞 Send the new rim photo.",
    };
    Outcome::new(OutcomeKind::Prompt, text).with_action("❌ Cancel", Action::Cancel)
}

/// Abandons the current fitting and shows the menu.
pub async fn cancel(ctx: &AppContext, user: &ChatUser) -> Result<Outcome> {
    if !ctx.sessions.cancel(&user.external_id) {
        return Ok(busy());
    }
    let account = user.ensure(ctx).await?;
    let mut menu = outcome::menu(&account);
    menu.text = format!("Cancelled. Back to the menu.\n\n{}", menu.text);
    Ok(menu)
}

/// Confirms the pending fitting: debit, generate, and refund on any failure.
#[instrument(skip(ctx, user), fields(external_id = %user.external_id))]
pub async fn confirm(ctx: &AppContext, user: &ChatUser) -> Result<Outcome> {
    let id = user.external_id.as_str();
    user.ensure(ctx).await?;

    let Some(upload) = ctx.sessions.begin_debit(id) else {
        return Ok(Outcome::new(
            OutcomeKind::Info,
            "There is no fitting waiting for confirmation. Upload both photos first.",
        )
        .with_action("🚘 Try on rims", Action::StartFitting));
    };

    let debit = match ledger::charge(&ctx.db, id, IMAGE_COST).await {
        Ok(debit) => debit,
        Err(Error::InsufficientBalance { current, required }) => {
            ctx.sessions.finish(id, None);
            return Ok(insufficient(ctx, current, required));
        }
        Err(e) => {
            error!("Debit for {} failed: {}", id, e);
            ctx.sessions.finish(id, None);
            return Ok(outcome::retry_later("start the fitting"));
        }
    };
    ctx.sessions.begin_generating(id);

    match render_image(ctx, id, &upload).await {
        Ok((result, bytes)) => {
            ctx.sessions.finish(id, Some(result));
            info!("Fitting for {} succeeded", id);
            let remaining = remaining_display(ctx, id).await;
            Ok(Outcome::new(
                OutcomeKind::Success,
                format!(
                    "Done! Here are your new rims 🚘\nGenerations left: {remaining}.\n\
                    Want a video? **🎬 Fly-around** costs {VIDEO_COST} generations."
                ),
            )
            .with_media("rimfit_result.jpg", bytes)
            .with_action("🎬 Fly-around", Action::Video)
            .with_action("🔁 New fitting", Action::StartFitting)
            .with_action("🏁 Menu", Action::Menu))
        }
        Err(e) => {
            warn!("Fitting for {} failed: {}", id, e);
            refund(ctx, id, IMAGE_COST, debit).await;
            ctx.sessions.finish(id, None);
            Ok(Outcome::new(
                OutcomeKind::Failure,
                "Sorry, the fitting didn't work this time. Your generation has been returned.",
            )
            .with_action("🔁 Try again", Action::StartFitting)
            .with_action("🏁 Menu", Action::Menu))
        }
    }
}

/// Renders a fly-around video from the latest fitting result.
#[instrument(skip(ctx, user), fields(external_id = %user.external_id))]
pub async fn generate_video(ctx: &AppContext, user: &ChatUser) -> Result<Outcome> {
    let id = user.external_id.as_str();
    user.ensure(ctx).await?;

    let Some(source) = ctx.sessions.begin_video(id) else {
        return Ok(Outcome::new(
            OutcomeKind::Info,
            "There's no fresh fitting yet. Generate an image with new rims first.",
        )
        .with_action("🚘 Try on rims", Action::StartFitting));
    };

    let debit = match ledger::charge(&ctx.db, id, VIDEO_COST).await {
        Ok(debit) => debit,
        Err(Error::InsufficientBalance { current, required }) => {
            ctx.sessions.finish(id, None);
            return Ok(insufficient(ctx, current, required));
        }
        Err(e) => {
            error!("Video debit for {} failed: {}", id, e);
            ctx.sessions.finish(id, None);
            return Ok(outcome::retry_later("start the video"));
        }
    };

    match render_video(ctx, id, &source).await {
        Ok(bytes) => {
            ctx.sessions.finish(id, None);
            info!("Video for {} succeeded", id);
            let remaining = remaining_display(ctx, id).await;
            Ok(Outcome::new(
                OutcomeKind::Success,
                format!("Your fly-around is ready 🎬\nGenerations left: {remaining}."),
            )
            .with_media("rimfit_flyby.mp4", bytes)
            .with_action("🔁 New fitting", Action::StartFitting)
            .with_action("🏁 Menu", Action::Menu))
        }
        Err(e) => {
            warn!("Video for {} failed: {}", id, e);
            refund(ctx, id, VIDEO_COST, debit).await;
            ctx.sessions.finish(id, None);
            Ok(Outcome::new(
                OutcomeKind::Failure,
                "Couldn't make the video. Try again later; the generations have been returned.",
            )
            .with_action("🏁 Menu", Action::Menu))
        }
    }
}

/// Compensating refund for a failed attempt. Only a debit that actually took credits is
/// refunded; a failed refund is logged for manual follow-up.
pub async fn refund(ctx: &AppContext, external_id: &str, cost: i64, debit: Debit) {
    if !debit.is_charged() {
        return;
    }
    match ledger::add_credits(&ctx.db, external_id, cost).await {
        Ok(user) => info!(
            "Refunded {} credits to {} (balance {})",
            cost, external_id, user.balance
        ),
        Err(e) => error!("Refund of {} credits to {} failed: {}", cost, external_id, e),
    }
}

async fn render_image(
    ctx: &AppContext,
    id: &str,
    upload: &PendingUpload,
) -> Result<(MediaRef, Vec<u8>)> {
    let car = load(ctx, &upload.car).await?;
    let wheel = load(ctx, &upload.wheel).await?;

    let bytes = bounded(
        ctx.settings.generation_timeout,
        "image generator",
        ctx.image.generate(&car, &wheel),
    )
    .await?;

    let result = ctx.media.put(id, MediaKind::Result, &bytes).await?;
    // the old video no longer matches the new result
    let stale = MediaRef {
        owner: id.to_string(),
        kind: MediaKind::Video,
    };
    if let Err(e) = ctx.media.delete(&stale).await {
        warn!("Failed to delete stale video for {}: {}", id, e);
    }
    Ok((result, bytes))
}

async fn render_video(ctx: &AppContext, id: &str, source: &MediaRef) -> Result<Vec<u8>> {
    let image = load(ctx, source).await?;
    let bytes = bounded(
        ctx.settings.video_timeout,
        "video generator",
        ctx.video.generate(&image),
    )
    .await?;
    ctx.media.put(id, MediaKind::Video, &bytes).await?;
    Ok(bytes)
}

async fn load(ctx: &AppContext, media: &MediaRef) -> Result<Vec<u8>> {
    ctx.media
        .get(media)
        .await?
        .ok_or_else(|| Error::InvariantViolation {
            message: format!("{:?} upload of {} is missing", media.kind, media.owner),
        })
}

/// A collaborator call that takes longer than `limit` counts as a failure.
async fn bounded<F>(limit: Duration, service: &str, call: F) -> Result<Vec<u8>>
where
    F: std::future::Future<Output = Result<Vec<u8>>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::upstream(service, format!("timed out after {}s", limit.as_secs_f32())))?
}

async fn remaining_display(ctx: &AppContext, id: &str) -> String {
    match ledger::find_user(&ctx.db, id).await {
        Ok(Some(user)) => outcome::balance_display(&user),
        _ => "?".to_string(),
    }
}

fn insufficient(ctx: &AppContext, current: i64, required: i64) -> Outcome {
    let mut shop = outcome::shop(
        &ctx.packages,
        &ctx.settings,
        &format!(
            "Not enough generations: this needs {required}, you have {current}. \
            Top up and try again:"
        ),
    );
    shop.kind = OutcomeKind::InsufficientBalance;
    shop
}

fn busy() -> Outcome {
    Outcome::new(
        OutcomeKind::Info,
        "⏳ Your previous generation is still running. Please wait for it to finish.",
    )
}
