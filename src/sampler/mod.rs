/*!
 * Adaptive Sampler
 * Dedup, probability sampling, rate limiting, and the rate feedback loop
 */

mod bucket;
mod dedup;
mod sampler;

pub use bucket::TokenBucket;
pub use dedup::DedupCache;
pub use sampler::AdaptiveSampler;
