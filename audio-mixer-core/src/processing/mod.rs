pub mod bridge;
pub mod echo;
pub mod gain;
pub mod levels;
pub mod mixer;
pub mod normalizer;
pub mod resampler;
pub mod ring_buffer;
