pub mod feature_pipeline;
pub mod filters;
pub mod preprocessor;
pub mod segmenter;
pub mod wavelet;
