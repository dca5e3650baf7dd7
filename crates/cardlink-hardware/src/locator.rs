//! Device locator.
//!
//! Picks the card scanner among all attached input devices using the
//! vendor/product/serial hints of a [`DeviceIdentity`].
//!
//! # Scoring
//!
//! | Check | Effect |
//! |-------|--------|
//! | vendor specified, candidate reports a different one | rejected |
//! | product specified, candidate reports a different one | rejected |
//! | vendor matches | +10 |
//! | product matches | +10 |
//! | serial matches exactly (case-insensitive) | +20 |
//! | reported serial contains the configured one (case-insensitive) | +5 |
//!
//! The highest score above zero wins; ties go to the first enumerated
//! candidate. The partial serial match tolerates the OS reporting a serial
//! in a different form than the label recorded by the backend.

use crate::Result;
use crate::types::InputCandidate;
use cardlink_core::DeviceIdentity;
use tracing::{debug, info};

/// Points for a matching vendor id.
pub const VENDOR_MATCH_SCORE: u32 = 10;

/// Points for a matching product id.
pub const PRODUCT_MATCH_SCORE: u32 = 10;

/// Points for an exact serial match.
pub const SERIAL_EXACT_SCORE: u32 = 20;

/// Points for a partial serial match.
pub const SERIAL_PARTIAL_SCORE: u32 = 5;

/// Source of attached input devices.
///
/// Implemented over evdev on Linux and by the mock keyboard in tests.
pub trait DeviceEnumerator: Send + Sync {
    /// List the input devices currently attached.
    fn enumerate(&self) -> Result<Vec<InputCandidate>>;
}

/// Score one candidate against an identity.
///
/// Returns `None` if the candidate is rejected by a vendor or product
/// mismatch. A candidate that does not report vendor or product is not
/// rejected on that field.
///
/// # Examples
///
/// ```
/// use cardlink_core::DeviceIdentity;
/// use cardlink_hardware::locator::score_candidate;
/// use cardlink_hardware::InputCandidate;
///
/// let identity = DeviceIdentity::new().with_vendor_id(0xFFFF).with_product_id(0x0035);
/// let reader = InputCandidate::new("/dev/input/event7", "RFID").with_ids(0xFFFF, 0x0035);
/// let keyboard = InputCandidate::new("/dev/input/event2", "Keyboard").with_ids(0x046D, 0xC31C);
///
/// assert_eq!(score_candidate(&identity, &reader), Some(20));
/// assert_eq!(score_candidate(&identity, &keyboard), None);
/// ```
#[must_use]
pub fn score_candidate(identity: &DeviceIdentity, candidate: &InputCandidate) -> Option<u32> {
    let mut score = 0;

    if let (Some(wanted), Some(actual)) = (identity.vendor_id, candidate.vendor_id) {
        if wanted != actual {
            return None;
        }
        score += VENDOR_MATCH_SCORE;
    }

    if let (Some(wanted), Some(actual)) = (identity.product_id, candidate.product_id) {
        if wanted != actual {
            return None;
        }
        score += PRODUCT_MATCH_SCORE;
    }

    let reported = candidate
        .serial
        .as_deref()
        .map(str::trim)
        .filter(|serial| !serial.is_empty());
    if let (Some(wanted), Some(reported)) = (identity.serial(), reported) {
        let wanted = wanted.to_lowercase();
        let reported = reported.to_lowercase();
        if wanted == reported {
            score += SERIAL_EXACT_SCORE;
        } else if reported.contains(&wanted) {
            score += SERIAL_PARTIAL_SCORE;
        }
    }

    Some(score)
}

/// Pick the best candidate for an identity.
///
/// Returns `None` if no candidate scores above zero.
#[must_use]
pub fn select_best<'a>(
    identity: &DeviceIdentity,
    candidates: &'a [InputCandidate],
) -> Option<&'a InputCandidate> {
    let mut best: Option<(u32, &InputCandidate)> = None;

    for candidate in candidates {
        let Some(score) = score_candidate(identity, candidate) else {
            continue;
        };
        debug!(candidate = %candidate, score, "Scored input device");

        if score > best.map_or(0, |(best_score, _)| best_score) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
}

/// Enumerate attached devices and pick the one matching `identity`.
///
/// # Errors
///
/// Returns `HardwareError::DeviceNotFound` if nothing matches, or the
/// enumerator's error if devices cannot be listed.
pub fn locate<E: DeviceEnumerator + ?Sized>(
    enumerator: &E,
    identity: &DeviceIdentity,
) -> Result<InputCandidate> {
    let candidates = enumerator.enumerate()?;
    debug!(count = candidates.len(), "Enumerated input devices");

    match select_best(identity, &candidates) {
        Some(candidate) => {
            info!(%identity, device = %candidate, "Located card reader");
            Ok(candidate.clone())
        }
        None => Err(crate::HardwareError::not_found(identity)),
    }
}
