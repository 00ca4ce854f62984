use serde_json::json;

use crate::commands::CommandResult;
use concierge_core::config::{AppConfig, LoadOptions};
use concierge_core::domain::reservation::ReservationSlots;
use concierge_core::validation::{ReservationValidator, ZonedClock};

#[derive(Debug, Clone, Default)]
pub struct ValidateArgs {
    pub location: Option<String>,
    pub cuisine: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub people: Option<String>,
    pub phone: Option<String>,
}

impl ValidateArgs {
    fn into_slots(self) -> ReservationSlots {
        let normalize = |value: Option<String>| {
            value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
        };
        ReservationSlots {
            location: normalize(self.location),
            cuisine: normalize(self.cuisine),
            date: normalize(self.date),
            time: normalize(self.time),
            num_of_people: normalize(self.people),
            phone_number: normalize(self.phone),
        }
    }
}

/// Runs the slot rules against the configured timezone's current time.
/// Exit code 1 means the slots were rejected.
pub fn run(args: ValidateArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "validate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    let timezone = match config.dialog.timezone() {
        Ok(timezone) => timezone,
        Err(error) => {
            return CommandResult::failure("validate", "config_validation", error.to_string(), 2);
        }
    };

    let slots = args.into_slots();
    let validator = ReservationValidator::new(config.dialog.validation_rules(), ZonedClock::new(timezone));
    let result = validator.validate(&slots);
    let data = json!({ "slots": slots, "result": result });

    if result.is_valid {
        CommandResult::success_with_data("validate", "all provided slots are valid", data)
    } else {
        let slot = result.violated_slot.map(|slot| slot.as_str()).unwrap_or("unknown");
        CommandResult::failure_with_data(
            "validate",
            "slot_rejected",
            format!("slot `{slot}` was rejected"),
            data,
            1,
        )
    }
}
