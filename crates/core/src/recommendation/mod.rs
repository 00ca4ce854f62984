pub mod message;
pub mod resolver;
pub mod sampler;

pub use message::{NotificationFormatter, DEFAULT_NOTIFICATION_TEMPLATE};
pub use resolver::{
    PollReport, Recommendation, RecommendationResolver, RecommendationSettings, ResolveError,
};
pub use sampler::{sample_distinct, RandomSource, SequenceRandomSource, ThreadRandomSource};
