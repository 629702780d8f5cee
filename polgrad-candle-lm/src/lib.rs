pub mod distributions;
pub mod mlp;
pub mod obs_norm;
pub mod optimizer;
pub mod policy;
pub mod regularizers;
