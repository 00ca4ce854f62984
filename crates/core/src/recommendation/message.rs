use tera::{Context, Tera};
use tracing::error;

use crate::domain::reservation::ReservationSlots;
use crate::domain::restaurant::RestaurantRecord;

const TEMPLATE_NAME: &str = "recommendation.txt";

pub const DEFAULT_NOTIFICATION_TEMPLATE: &str = "Thank you for waiting, after careful research, \
Here is my restaurant recommendation: \n\
{% for restaurant in restaurants %}{{ loop.index }}.\n\
Restaurant name: {{ restaurant.name }}\n\
Address: {{ restaurant.address }}\n\
Rating: {{ restaurant.rating }}\n\
{% endfor %}\nBon appetit";

/// Renders the plain-text notification body. The template sees
/// `restaurants` (records in recommendation order) and `reservation` (the
/// queued slot values).
pub struct NotificationFormatter {
    tera: Tera,
}

impl NotificationFormatter {
    pub fn new(template: &str) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, template)?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        restaurants: &[RestaurantRecord],
        reservation: &ReservationSlots,
    ) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("restaurants", restaurants);
        context.insert("reservation", reservation);
        self.tera.render(TEMPLATE_NAME, &context)
    }
}

impl Default for NotificationFormatter {
    /// Falls back to an empty registry when the bundled template fails to
    /// parse, so every render then reports the error.
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_TEMPLATE).unwrap_or_else(|error| {
            error!(
                event_name = "recommendation.template_invalid",
                error = %error,
                "bundled notification template failed to parse"
            );
            Self { tera: Tera::default() }
        })
    }
}
