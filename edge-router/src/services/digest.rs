use std::{fs, path::PathBuf};

use chrono::{Datelike, Local};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use common::utils::{hashing::user_hash, time::now_utc_iso};

/// Static tip table; the day-of-year rotation picks one deterministically.
const ENERGY_TIPS: [(&str, &str); 5] = [
    (
        "When boiling water, only fill your kettle with the amount you actually need. Most people \
         boil 2-3 times more water than necessary.",
        "This simple habit can save up to \u{20ac}50 per year on your electricity bill.",
    ),
    (
        "Check for 'phantom loads' - devices that consume power even when turned off. Common \
         culprits include TVs, coffee makers, and phone chargers.",
        "Eliminating phantom loads can reduce your electricity consumption by 5-10%.",
    ),
    (
        "Use your dishwasher's eco mode and only run it when it's full. The eco mode uses less \
         water and energy, even though it takes longer.",
        "This can save up to \u{20ac}40 per year compared to normal wash cycles.",
    ),
    (
        "Set your water heater temperature to 60\u{b0}C (140\u{b0}F). Higher temperatures waste \
         energy and can be dangerous.",
        "Lowering from 70\u{b0}C to 60\u{b0}C can save 6-10% on water heating costs.",
    ),
    (
        "Close curtains and blinds during hot summer days to keep your home cooler naturally, \
         reducing air conditioning needs.",
        "This simple step can reduce cooling costs by up to 15% during summer months.",
    ),
];

/// Once-per-user-per-day energy digest with file-based tracking.
///
/// Day boundaries use the server's local timezone, like the conversation
/// archive stamps. Tracking I/O failures err on the side of showing the
/// digest.
pub struct DigestService {
    tracking_dir: PathBuf,
}

impl DigestService {
    pub fn new(user_data_dir: &std::path::Path) -> Self {
        Self {
            tracking_dir: user_data_dir.join("digest_tracking"),
        }
    }

    /// Builds today's digest payload in the `dailyReport` shape.
    pub fn generate_daily_digest(&self) -> Value {
        let now = Local::now();
        let current_date = now.format("%B %d, %Y").to_string();
        let day_of_year = now.ordinal() as usize;
        let tip_index = day_of_year % ENERGY_TIPS.len();
        let (tip, savings) = ENERGY_TIPS[tip_index];

        info!(tip_number = tip_index + 1, "Generated daily digest");
        json!({
            "message": format!("Good morning! Here's your daily energy efficiency digest for {current_date}."),
            "type": "dailyReport",
            "content": [{
                "title": "Daily Energy Tip",
                "tip": tip,
                "potentialSavings": savings,
                "date": current_date,
                "tipNumber": tip_index + 1,
                "totalTips": ENERGY_TIPS.len(),
            }]
        })
    }

    /// Whether the digest should be shown now for this user; updates the
    /// tracking record when it answers `true`.
    pub fn should_show(&self, location_id: &str, user_email: Option<&str>) -> bool {
        let Some(email) = user_email else {
            debug!(location_id, "No user email; showing digest (legacy mode)");
            return true;
        };

        let hash = user_hash(email);
        let tracking_file = self.tracking_dir.join(format!("{hash}_digest_log.json"));
        let today = Local::now().format("%Y-%m-%d").to_string();

        let mut tracking: Value = fs::read_to_string(&tracking_file)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| json!({}));

        if tracking.get("last_digest_date").and_then(Value::as_str) == Some(today.as_str()) {
            debug!(user = email, %today, "Digest already shown today");
            return false;
        }

        tracking["last_digest_date"] = json!(today);
        tracking["location_id"] = json!(location_id);
        tracking["user_email"] = json!(email);
        tracking["user_hash"] = json!(hash);
        tracking["last_updated"] = json!(now_utc_iso());

        let write_result = fs::create_dir_all(&self.tracking_dir).and_then(|()| {
            fs::write(
                &tracking_file,
                serde_json::to_string_pretty(&tracking).unwrap_or_default(),
            )
        });
        if let Err(err) = write_result {
            error!(error = %err, user = email, "Digest tracking write failed; showing digest");
        }
        true
    }

    /// Formats the digest for conversation-history injection as an assistant
    /// message carrying the interaction id.
    pub fn format_for_injection(digest: &Value, interaction_id: &str) -> String {
        let mut with_id = digest.clone();
        with_id["interactionId"] = json!(interaction_id);
        serde_json::to_string_pretty(&with_id).unwrap_or_else(|_| with_id.to_string())
    }
}
