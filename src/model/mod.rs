pub mod bundle;
pub mod classifier;
pub mod codec;
pub mod gru;
pub mod metrics;
pub mod reducer;
