//! BlueprintService: JSON:API actions over any [`Store`](crate::store::Store).

mod blueprint;
mod validation;
pub use blueprint::BlueprintService;
pub use validation::RequestValidator;
